use anyhow::Result;
use censusdb::{LoadConfig, LoadMode, LoadReport, Pipeline, Store};
use std::{env, path::PathBuf, time::Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,censusdb=info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration: optional YAML, then CENSUSDB_* overrides ──
    let cfg = match env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!(config = %path.display(), "loading config");
            LoadConfig::from_yaml_file(&path)?
        }
        None => LoadConfig::default(),
    }
    .with_env_overrides()?;

    if let Err(e) = cfg.validate() {
        error!("invalid configuration: {}", e);
        return Err(e.into());
    }
    let catalog = cfg.load_catalog()?;
    info!(
        mode = ?cfg.mode,
        root = %cfg.root.display(),
        database = %cfg.target_database().display(),
        start_year = cfg.start_year,
        end_year = cfg.end_year,
        chunk_size = cfg.chunk_size,
        "configured"
    );

    // ─── 3) load on the blocking pool; DuckDB and the reader are sync ─
    let start = Instant::now();
    let report: LoadReport = tokio::task::spawn_blocking(move || -> Result<LoadReport> {
        let mut store = Store::open(cfg.target_database(), cfg.schema_policy)?;
        let mut pipeline = Pipeline::from_config(&mut store, &catalog, &cfg)?;
        let report = match cfg.mode {
            LoadMode::Years => pipeline.run_years(&cfg.root, cfg.start_year, cfg.end_year)?,
            LoadMode::Sample => pipeline.run_sample(&cfg.root, cfg.start_year),
        };
        Ok(report)
    })
    .await?
    .inspect_err(|e| error!("load aborted: {:#}", e))?;

    // ─── 4) summary ──────────────────────────────────────────────────
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        total_rows = report.total_rows,
        rows_written = report.rows_written,
        files = report.files.len(),
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}

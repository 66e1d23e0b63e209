// src/pipeline/mod.rs

pub mod discover;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::Catalog;
use crate::config::LoadConfig;
use crate::duck::{DedupOutcome, Store};
use crate::error::LoadError;
use crate::process::{split_batch, ChunkReader, ReadOptions};
use discover::{
    discover_csv_files, find_sample_file, sample_file_name, scan_years, year_data_dir,
};

/// Lifecycle of one input file within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Pending,
    Processing,
    Done,
    Failed,
}

impl FileState {
    pub fn as_str(&self) -> &str {
        match self {
            FileState::Pending => "pending",
            FileState::Processing => "processing",
            FileState::Done => "done",
            FileState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FileState::Done | FileState::Failed)
    }

    fn can_become(&self, next: FileState) -> bool {
        matches!(
            (self, next),
            (FileState::Pending, FileState::Processing)
                | (FileState::Processing, FileState::Done)
                | (FileState::Processing, FileState::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub state: FileState,
    pub chunks: usize,
    /// Rows that passed the null policy and were handed to the store.
    pub rows: u64,
    /// Rows that landed in the fact table.
    pub rows_written: u64,
    /// Rows removed by the null policy.
    pub dropped: u64,
    /// Tables this file could not feed because it lacks some of their columns.
    pub skipped_tables: Vec<String>,
    /// Table appends that failed; the other tables of the chunk still ran.
    pub write_errors: usize,
    pub error: Option<String>,
}

impl FileOutcome {
    fn pending(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: FileState::Pending,
            chunks: 0,
            rows: 0,
            rows_written: 0,
            dropped: 0,
            skipped_tables: Vec::new(),
            write_errors: 0,
            error: None,
        }
    }

    fn transition(&mut self, next: FileState) {
        debug_assert!(
            self.state.can_become(next),
            "illegal file transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!(
            file = %self.path.display(),
            from = self.state.as_str(),
            to = next.as_str(),
            "file state"
        );
        self.state = next;
    }
}

/// Summary of one run; always produced, whatever failed along the way.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileOutcome>,
    pub total_rows: u64,
    pub rows_written: u64,
    pub dedup: Vec<DedupOutcome>,
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
            total_rows: 0,
            rows_written: 0,
            dedup: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn files_in(&self, state: FileState) -> usize {
        self.files.iter().filter(|f| f.state == state).count()
    }
}

/// Drives files through read → split → write, then deduplicates once.
///
/// Strictly sequential: one file, and within it one chunk, at a time.
pub struct Pipeline<'a> {
    store: &'a mut Store,
    catalog: &'a Catalog,
    options: ReadOptions,
    chunk_size: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a mut Store,
        catalog: &'a Catalog,
        options: ReadOptions,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            options,
            chunk_size,
        }
    }

    pub fn from_config(
        store: &'a mut Store,
        catalog: &'a Catalog,
        cfg: &LoadConfig,
    ) -> Result<Self, LoadError> {
        cfg.validate()?;
        Ok(Self::new(
            store,
            catalog,
            ReadOptions::from_config(cfg)?,
            cfg.chunk_size,
        ))
    }

    /// Load the `<root>/<year>/dados` directories of `start..=end`.
    /// Absent years become warnings; a missing root aborts before any work.
    pub fn run_years(
        &mut self,
        root: &Path,
        start: i32,
        end: i32,
    ) -> Result<LoadReport, LoadError> {
        let scan = scan_years(root, start, end)?;
        let mut report = LoadReport::new();
        for (year, dir) in &scan.missing {
            report
                .warnings
                .push(format!("directory for year {} not found: {}", year, dir.display()));
        }

        let mut files = Vec::new();
        for (year, dir) in &scan.found {
            info!(year, dir = %dir.display(), "processing files for year");
            match discover_csv_files(dir) {
                Ok(found) => files.extend(found),
                Err(e) => {
                    error!(year, "error listing files: {:#}", e);
                    report
                        .warnings
                        .push(format!("error listing files for year {}: {:#}", year, e));
                }
            }
        }

        self.load_all(&files, &mut report);
        Ok(report)
    }

    /// Load every CSV below `dir`.
    pub fn run_directory(&mut self, dir: &Path) -> Result<LoadReport, LoadError> {
        if !dir.is_dir() {
            error!(dir = %dir.display(), "directory does not exist");
            return Err(LoadError::MissingDirectory(dir.to_path_buf()));
        }
        let mut report = LoadReport::new();
        match discover_csv_files(dir) {
            Ok(files) => self.load_all(&files, &mut report),
            Err(e) => {
                report.warnings.push(format!("{:#}", e));
                self.load_all(&[], &mut report);
            }
        }
        Ok(report)
    }

    /// Load only the course extract of `year`. A missing file is a warning
    /// on the report, not an error.
    pub fn run_sample(&mut self, root: &Path, year: i32) -> LoadReport {
        let mut report = LoadReport::new();
        match find_sample_file(root, year) {
            Some(file) => {
                info!(year, file = %file.display(), "loading sample file");
                self.load_all(&[file], &mut report);
            }
            None => {
                let expected = year_data_dir(root, year).join(sample_file_name(year));
                warn!(year, file = %expected.display(), "sample file for year not found");
                report.warnings.push(format!(
                    "sample file for year {} not found: {}",
                    year,
                    expected.display()
                ));
                report.finished_at = Some(Utc::now());
            }
        }
        report
    }

    /// Load an explicit file list.
    pub fn run_files(&mut self, files: &[PathBuf]) -> LoadReport {
        let mut report = LoadReport::new();
        self.load_all(files, &mut report);
        report
    }

    fn load_all(&mut self, files: &[PathBuf], report: &mut LoadReport) {
        info!(files = files.len(), "starting CSV file processing");

        for path in files {
            let outcome = self.load_file(path);
            report.total_rows += outcome.rows;
            report.rows_written += outcome.rows_written;
            report.files.push(outcome);
        }
        info!(total_rows = report.total_rows, "Total rows processed");

        report.dedup = self.store.deduplicate_catalog(self.catalog);
        report.finished_at = Some(Utc::now());

        info!(
            done = report.files_in(FileState::Done),
            failed = report.files_in(FileState::Failed),
            total_rows = report.total_rows,
            rows_written = report.rows_written,
            "CSV file processing completed"
        );
    }

    /// Load one file. Never returns an error: failures end in `Failed` with
    /// the cause recorded, and the rows already written stay written.
    #[instrument(level = "info", skip(self, path), fields(file = %path.display()))]
    pub fn load_file(&mut self, path: &Path) -> FileOutcome {
        let mut outcome = FileOutcome::pending(path);
        outcome.transition(FileState::Processing);
        info!("starting processing for file");

        match self.process_file(path, &mut outcome) {
            Ok(()) => {
                outcome.transition(FileState::Done);
                if outcome.write_errors > 0 {
                    warn!(write_errors = outcome.write_errors, "finished with failed table writes");
                }
                if outcome.rows > 0 && outcome.rows_written == 0 {
                    warn!(rows = outcome.rows, "no rows reached the fact table");
                }
                info!(rows = outcome.rows, chunks = outcome.chunks, "finished processing file");
            }
            Err(e) => {
                outcome.transition(FileState::Failed);
                error!("error processing file: {:#}", e);
                debug!("{:?}", e);
                outcome.error = Some(format!("{:#}", e));
            }
        }
        outcome
    }

    fn process_file(&mut self, path: &Path, outcome: &mut FileOutcome) -> Result<()> {
        let reader = ChunkReader::for_file(
            path,
            Some(self.catalog.selected_columns.as_slice()),
            self.catalog,
            self.options,
            self.chunk_size,
        )?;

        for chunk in reader {
            let chunk = chunk?;
            let split = split_batch(&chunk.batch, self.catalog)?;

            for table in &split.skipped {
                if outcome.skipped_tables.contains(table) {
                    continue;
                }
                if *table == self.catalog.fact.name {
                    warn!(table = %table, "fact columns absent, file feeds dimensions only");
                } else {
                    debug!(table = %table, "columns absent, table not fed by this file");
                }
                outcome.skipped_tables.push(table.clone());
            }

            for projection in split.projections() {
                match self.store.append(&projection.table, &projection.batch) {
                    Ok(n) if projection.table == self.catalog.fact.name => {
                        outcome.rows_written += n as u64;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(
                            table = %projection.table,
                            chunk = chunk.index,
                            "error writing chunk: {:#}",
                            e
                        );
                        outcome.write_errors += 1;
                    }
                }
            }

            let rows = chunk.batch.num_rows() as u64;
            outcome.chunks += 1;
            outcome.rows += rows;
            outcome.dropped += chunk.dropped as u64;
            info!(chunk = chunk.index, rows, dropped = chunk.dropped, "inserted chunk");
        }
        Ok(())
    }
}

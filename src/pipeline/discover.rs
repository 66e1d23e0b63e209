// src/pipeline/discover.rs

use anyhow::{Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::LoadError;

/// Yearly extracts live under `<root>/<year>/dados`.
pub fn year_data_dir(root: &Path, year: i32) -> PathBuf {
    root.join(year.to_string()).join("dados")
}

/// Name of the course extract published for `year`.
pub fn sample_file_name(year: i32) -> String {
    format!("MICRODADOS_CADASTRO_CURSOS_{}.csv", year)
}

/// The course extract of `year` under its data directory, matching the
/// file name without regard to case.
pub fn find_sample_file(root: &Path, year: i32) -> Option<PathBuf> {
    let dir = year_data_dir(root, year);
    let wanted = sample_file_name(year);
    let exact = dir.join(&wanted);
    if exact.is_file() {
        return Some(exact);
    }
    fs::read_dir(&dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map_or(false, |n| n.to_string_lossy().eq_ignore_ascii_case(&wanted))
        })
}

/// Outcome of looking for the per-year directories of a range.
#[derive(Debug, Default)]
pub struct YearScan {
    pub found: Vec<(i32, PathBuf)>,
    pub missing: Vec<(i32, PathBuf)>,
}

/// Resolve the data directory of every year in `start..=end`. Absent years
/// are logged and returned in `missing`; only a missing root is an error.
pub fn scan_years(root: &Path, start: i32, end: i32) -> Result<YearScan, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::MissingDirectory(root.to_path_buf()));
    }
    let mut scan = YearScan::default();
    for year in start..=end {
        let dir = year_data_dir(root, year);
        if dir.is_dir() {
            scan.found.push((year, dir));
        } else {
            warn!(year, dir = %dir.display(), "directory for year not found");
            scan.missing.push((year, dir));
        }
    }
    Ok(scan)
}

/// Every `*.csv` (any case) below `dir`, sorted for a stable load order.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LoadError::MissingDirectory(dir.to_path_buf()).into());
    }
    let pattern = format!("{}/**/*.csv", Pattern::escape(&dir.to_string_lossy()));
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    let mut files = Vec::new();
    for entry in glob_with(&pattern, options).context("invalid glob pattern for CSV discovery")? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("cannot read glob entry: {:?}", e),
        }
    }
    files.sort();
    Ok(files)
}

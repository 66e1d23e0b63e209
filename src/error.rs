// src/error.rs

use std::path::PathBuf;

/// Failures the orchestrator and the binary branch on. Everything else
/// travels as `anyhow::Error` with context attached.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Input directory (root or a single scan directory) is absent.
    #[error("input directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A batch does not fit the schema of an already-created table.
    #[error("table `{table}` schema mismatch: {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// An arrow column type with no store mapping.
    #[error("column `{column}` has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: String },
}

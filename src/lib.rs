pub mod catalog;
pub mod config;
pub mod duck;
pub mod error;
pub mod pipeline;
pub mod process;

pub use catalog::{Catalog, ColumnKind, TableSpec, TypeRules};
pub use config::{LoadConfig, LoadMode, SchemaPolicy};
pub use duck::Store;
pub use error::LoadError;
pub use pipeline::{FileState, LoadReport, Pipeline};

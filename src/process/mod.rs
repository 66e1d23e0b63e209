// src/process/mod.rs

pub mod chunk;
pub mod convert;
pub mod encoding;
pub mod plan;
pub mod split;
pub mod utils;

pub use chunk::{Chunk, ChunkReader};
pub use plan::{PlannedColumn, ReadOptions, ReadPlan};
pub use split::{split_batch, BatchSplit, Projection};

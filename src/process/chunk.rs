// src/process/chunk.rs

use anyhow::{bail, Context, Result};
use arrow::csv::{Reader, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::convert::{convert_to_final_types, drop_incomplete_rows};
use super::encoding::DecodingReader;
use super::plan::{ReadOptions, ReadPlan};
use crate::catalog::Catalog;

/// One typed slice of a file.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Zero-based position of the chunk in the file.
    pub index: usize,
    /// Rows read from the file for this chunk, before the null policy.
    pub raw_rows: usize,
    /// Rows removed because a selected column was missing.
    pub dropped: usize,
    pub batch: RecordBatch,
}

/// Lazily pulls bounded batches from one delimited file, in file order.
///
/// Holds at most one chunk worth of rows. A finished reader cannot be
/// rewound; reopen the file to read it again.
pub struct ChunkReader {
    path: PathBuf,
    plan: ReadPlan,
    reader: Reader<DecodingReader<File>>,
    next_index: usize,
}

impl ChunkReader {
    /// Open `path` against an already-built plan.
    pub fn open<P: AsRef<Path>>(path: P, plan: ReadPlan, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;

        // Short rows become nulls and fall to the null policy; long rows fail.
        let reader = ReaderBuilder::new(plan.read_schema())
            .with_header(true)
            .with_delimiter(plan.options.delimiter)
            .with_batch_size(chunk_size)
            .with_projection(plan.projection())
            .with_truncated_rows(true)
            .build(DecodingReader::new(file, plan.options.encoding))
            .with_context(|| format!("creating CSV reader for {}", path.display()))?;

        Ok(Self {
            path,
            plan,
            reader,
            next_index: 0,
        })
    }

    /// Both phases in one call: plan from the header, then open for reading.
    pub fn for_file<P: AsRef<Path>>(
        path: P,
        requested: Option<&[String]>,
        catalog: &Catalog,
        options: ReadOptions,
        chunk_size: usize,
    ) -> Result<Self> {
        let plan = ReadPlan::from_header(&path, requested, catalog, options)?;
        Self::open(path, plan, chunk_size)
    }

    pub fn plan(&self) -> &ReadPlan {
        &self.plan
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next batch exactly as parsed: planned columns, all Utf8, nothing dropped.
    pub fn next_raw(&mut self) -> Option<Result<RecordBatch>> {
        let path = &self.path;
        self.reader
            .next()
            .map(|res| res.with_context(|| format!("CSV parse error in {}", path.display())))
    }

    fn finish_chunk(&self, index: usize, raw: RecordBatch) -> Result<Chunk> {
        let raw_rows = raw.num_rows();
        let (complete, dropped) = drop_incomplete_rows(&raw)?;
        let batch = convert_to_final_types(&complete, &self.plan).with_context(|| {
            format!("coercing chunk {} of {}", index, self.path.display())
        })?;

        debug!(
            file = %self.path.display(),
            chunk = index,
            rows = batch.num_rows(),
            dropped,
            "chunk ready"
        );
        Ok(Chunk {
            index,
            raw_rows,
            dropped,
            batch,
        })
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.next_raw()? {
            Ok(batch) => batch,
            Err(e) => return Some(Err(e)),
        };
        let index = self.next_index;
        self.next_index += 1;
        Some(self.finish_chunk(index, raw))
    }
}

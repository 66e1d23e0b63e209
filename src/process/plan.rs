// src/process/plan.rs

use anyhow::{bail, Context, Result};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use encoding_rs::Encoding;
use std::{collections::HashSet, fs::File, path::Path, sync::Arc};
use tracing::{debug, warn};

use super::encoding::DecodingReader;
use crate::catalog::{Catalog, ColumnKind};
use crate::config::LoadConfig;
use crate::error::LoadError;

/// How the bytes of an input file are laid out.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            encoding: encoding_rs::WINDOWS_1252,
        }
    }
}

impl ReadOptions {
    pub fn from_config(cfg: &LoadConfig) -> Result<Self, LoadError> {
        Ok(Self {
            delimiter: cfg.delimiter_byte()?,
            encoding: cfg.resolve_encoding()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedColumn {
    pub name: String,
    /// Position in the file header.
    pub header_index: usize,
    pub kind: ColumnKind,
    /// Selected by prefix discovery rather than by request.
    pub discovered: bool,
}

/// Per-file column selection and typing, fixed before any data row is read.
#[derive(Debug, Clone)]
pub struct ReadPlan {
    pub header: Vec<String>,
    /// Selected columns in header order.
    pub columns: Vec<PlannedColumn>,
    /// Requested columns the file does not have.
    pub missing: Vec<String>,
    pub options: ReadOptions,
}

impl ReadPlan {
    /// Read only the header line of `path` and plan against it.
    ///
    /// `requested = None` selects every header column.
    pub fn from_header<P: AsRef<Path>>(
        path: P,
        requested: Option<&[String]>,
        catalog: &Catalog,
        options: ReadOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let header = read_header(path, &options)?;
        let plan = Self::from_header_names(header, requested, catalog, options)?;
        if !plan.missing.is_empty() {
            warn!(
                file = %path.display(),
                missing = ?plan.missing,
                "requested columns not present in file"
            );
        }
        debug!(
            file = %path.display(),
            selected = plan.columns.len(),
            discovered = plan.columns.iter().filter(|c| c.discovered).count(),
            "read plan built"
        );
        Ok(plan)
    }

    pub fn from_header_names(
        header: Vec<String>,
        requested: Option<&[String]>,
        catalog: &Catalog,
        options: ReadOptions,
    ) -> Result<Self> {
        let present: HashSet<&str> = header.iter().map(String::as_str).collect();

        let wanted: Option<HashSet<&str>> =
            requested.map(|cols| cols.iter().map(String::as_str).collect());

        let columns: Vec<PlannedColumn> = header
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                let listed = wanted.as_ref().map_or(true, |w| w.contains(name.as_str()));
                let discovered = !listed && catalog.is_discovered(name);
                (listed || discovered).then(|| PlannedColumn {
                    name: name.clone(),
                    header_index: idx,
                    kind: catalog.type_rules.kind_of(name),
                    discovered,
                })
            })
            .collect();

        if columns.is_empty() {
            bail!("none of the requested columns are present in the header");
        }
        // a repeated name only matters when that column is read
        let mut planned = HashSet::with_capacity(columns.len());
        for col in &columns {
            if !planned.insert(col.name.as_str()) {
                bail!("duplicate header column `{}`", col.name);
            }
        }

        let missing = requested
            .unwrap_or_default()
            .iter()
            .filter(|c| !present.contains(c.as_str()))
            .cloned()
            .collect();

        Ok(Self {
            header,
            columns,
            missing,
            options,
        })
    }

    /// Every header column as nullable Utf8; what the CSV decoder parses.
    pub fn read_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .header
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        Arc::new(Schema::new(fields))
    }

    pub fn projection(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.header_index).collect()
    }

    /// Schema of the batches after type coercion.
    pub fn typed_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(&c.name, c.kind.arrow_type(), false))
            .collect();
        Arc::new(Schema::new(fields))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

fn read_header(path: &Path, options: &ReadOptions) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .from_reader(DecodingReader::new(file, options.encoding));

    let headers = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?;
    let names: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if names.iter().all(|n| n.is_empty()) {
        bail!("{} has an empty header", path.display());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn count_columns_are_discovered_from_header() -> Result<()> {
        let catalog = Catalog::census();
        let header = names(&[
            "NU_ANO_CENSO",
            "CO_IES",
            "QT_MAT",
            "QT_ING_FEM",
            "NO_IES",
            "QT_CONC",
        ]);
        let requested = names(&["NU_ANO_CENSO", "CO_IES", "CO_CURSO"]);

        let plan = ReadPlan::from_header_names(
            header,
            Some(&requested),
            &catalog,
            ReadOptions::default(),
        )?;

        let selected: Vec<&str> = plan.column_names().collect();
        assert_eq!(selected, vec!["NU_ANO_CENSO", "CO_IES", "QT_ING_FEM", "QT_CONC"]);
        assert_eq!(plan.projection(), vec![0, 1, 3, 5]);
        assert_eq!(plan.missing, vec!["CO_CURSO".to_string()]);
        assert!(plan.columns[2].discovered);
        assert_eq!(plan.columns[2].kind, ColumnKind::Count);
        Ok(())
    }

    #[test]
    fn no_request_selects_everything() -> Result<()> {
        let plan = ReadPlan::from_header_names(
            names(&["A", "NO_B", "IN_C"]),
            None,
            &Catalog::census(),
            ReadOptions::default(),
        )?;
        assert_eq!(plan.columns.len(), 3);
        assert!(plan.missing.is_empty());
        let schema = plan.typed_schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Int8);
        Ok(())
    }

    #[test]
    fn duplicate_header_is_rejected_when_selected() {
        let res = ReadPlan::from_header_names(
            names(&["CO_IES", "CO_IES"]),
            None,
            &Catalog::census(),
            ReadOptions::default(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn duplicate_header_outside_the_selection_is_ignored() -> Result<()> {
        let requested = names(&["CO_IES", "CO_CURSO"]);
        let plan = ReadPlan::from_header_names(
            names(&["TX_OBS", "CO_IES", "TX_OBS", "CO_CURSO"]),
            Some(&requested),
            &Catalog::census(),
            ReadOptions::default(),
        )?;
        assert_eq!(plan.projection(), vec![1, 3]);
        Ok(())
    }

    #[test]
    fn header_is_read_from_latin1_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        // BOM-free latin-1 header with a quoted name, then one data row
        file.write_all(b"\"NU_ANO_CENSO\";NO_REGIAO;CO_REGIAO\n2023;Sudeste;3\n")?;

        let plan = ReadPlan::from_header(
            file.path(),
            None,
            &Catalog::census(),
            ReadOptions::default(),
        )?;
        assert_eq!(plan.header, names(&["NU_ANO_CENSO", "NO_REGIAO", "CO_REGIAO"]));
        Ok(())
    }

    #[test]
    fn byte_order_mark_does_not_rename_the_first_column() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&[0xEF, 0xBB, 0xBF])?;
        file.write_all(b"NU_ANO_CENSO;CO_IES\n2023;10\n")?;

        let requested = names(&["NU_ANO_CENSO", "CO_IES"]);
        let plan = ReadPlan::from_header(
            file.path(),
            Some(&requested),
            &Catalog::census(),
            ReadOptions::default(),
        )?;
        assert_eq!(plan.header[0], "NU_ANO_CENSO");
        assert!(plan.missing.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let res = ReadPlan::from_header(
            "/definitely/not/here.csv",
            None,
            &Catalog::census(),
            ReadOptions::default(),
        );
        assert!(res.is_err());
    }
}

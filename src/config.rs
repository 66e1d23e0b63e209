// src/config.rs

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::File,
    path::{Path, PathBuf},
};

use crate::catalog::Catalog;
use crate::error::LoadError;

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// What the store does when a batch does not match an existing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPolicy {
    /// Any difference in column set or type fails the write.
    #[default]
    Reject,
    /// New columns are added to the table; columns the batch lacks are
    /// written as NULL. Type conflicts still fail.
    Extend,
}

/// Which inputs a run loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Every CSV under `<root>/<year>/dados` for the configured years.
    #[default]
    Years,
    /// Only the course extract of `start_year`, into `sample_database`.
    Sample,
}

impl std::str::FromStr for LoadMode {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "years" => Ok(LoadMode::Years),
            "sample" => Ok(LoadMode::Sample),
            other => Err(LoadError::Config(format!("unknown mode `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub mode: LoadMode,
    /// Directory holding `<year>/dados/*.csv`.
    pub root: PathBuf,
    /// DuckDB file; `:memory:` keeps everything in RAM.
    pub database: PathBuf,
    /// Separate database used by `LoadMode::Sample`.
    pub sample_database: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    pub chunk_size: usize,
    pub delimiter: char,
    /// Any WHATWG label understood by encoding_rs.
    pub encoding: String,
    pub schema_policy: SchemaPolicy,
    /// Optional YAML catalog; the built-in census catalog otherwise.
    pub catalog: Option<PathBuf>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            mode: LoadMode::Years,
            root: PathBuf::from("INEP/Microdados_Censo_da_Educacao_Superior"),
            database: PathBuf::from("inep.duckdb"),
            sample_database: PathBuf::from("inep_test.duckdb"),
            start_year: 2023,
            end_year: 2023,
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: ';',
            encoding: "latin1".to_string(),
            schema_policy: SchemaPolicy::Reject,
            catalog: None,
        }
    }
}

impl LoadConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let cfg: LoadConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Overlay `CENSUSDB_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = env::var("CENSUSDB_MODE") {
            self.mode = v.parse()?;
        }
        if let Ok(v) = env::var("CENSUSDB_ROOT") {
            self.root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CENSUSDB_DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CENSUSDB_START_YEAR") {
            self.start_year = v.parse().context("CENSUSDB_START_YEAR")?;
        }
        if let Ok(v) = env::var("CENSUSDB_END_YEAR") {
            self.end_year = v.parse().context("CENSUSDB_END_YEAR")?;
        }
        if let Ok(v) = env::var("CENSUSDB_CHUNK_SIZE") {
            self.chunk_size = v.parse().context("CENSUSDB_CHUNK_SIZE")?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.chunk_size == 0 {
            return Err(LoadError::Config("chunk_size must be positive".into()));
        }
        if self.start_year > self.end_year {
            return Err(LoadError::Config(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        self.delimiter_byte()?;
        self.resolve_encoding()?;
        Ok(())
    }

    pub fn delimiter_byte(&self) -> Result<u8, LoadError> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(LoadError::Config(format!(
                "delimiter {:?} is not a single byte",
                self.delimiter
            )))
        }
    }

    pub fn resolve_encoding(&self) -> Result<&'static Encoding, LoadError> {
        Encoding::for_label(self.encoding.as_bytes())
            .ok_or_else(|| LoadError::Config(format!("unknown encoding `{}`", self.encoding)))
    }

    /// Database the configured mode writes to.
    pub fn target_database(&self) -> &Path {
        match self.mode {
            LoadMode::Years => &self.database,
            LoadMode::Sample => &self.sample_database,
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Catalog::from_yaml_file(path),
            None => Ok(Catalog::census()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let cfg = LoadConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.chunk_size, 50_000);
        assert_eq!(cfg.delimiter_byte().unwrap(), b';');
        assert_eq!(cfg.resolve_encoding().unwrap(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "root: /data/inep\nstart_year: 2019\nend_year: 2021")?;
        writeln!(file, "schema_policy: extend")?;

        let cfg = LoadConfig::from_yaml_file(file.path())?;
        assert_eq!(cfg.root, PathBuf::from("/data/inep"));
        assert_eq!(cfg.start_year, 2019);
        assert_eq!(cfg.end_year, 2021);
        assert_eq!(cfg.schema_policy, SchemaPolicy::Extend);
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.mode, LoadMode::Years);
        Ok(())
    }

    #[test]
    fn sample_mode_writes_to_its_own_database() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "mode: sample\nstart_year: 2022")?;

        let cfg = LoadConfig::from_yaml_file(file.path())?;
        assert_eq!(cfg.mode, LoadMode::Sample);
        assert_eq!(cfg.target_database(), Path::new("inep_test.duckdb"));
        assert_eq!(LoadConfig::default().target_database(), Path::new("inep.duckdb"));

        assert_eq!("Sample".parse::<LoadMode>()?, LoadMode::Sample);
        assert!("weekly".parse::<LoadMode>().is_err());
        Ok(())
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let cfg = LoadConfig {
            chunk_size: 0,
            ..LoadConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(LoadError::Config(_))));

        let cfg = LoadConfig {
            start_year: 2024,
            end_year: 2020,
            ..LoadConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = LoadConfig {
            encoding: "klingon".into(),
            ..LoadConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = LoadConfig {
            delimiter: '§',
            ..LoadConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

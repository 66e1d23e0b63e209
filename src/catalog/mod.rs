// src/catalog/mod.rs

pub mod types;

pub use types::{ColumnKind, PrefixRule, TypeRules};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs::File, path::Path};

use crate::error::LoadError;

/// One destination table: its source columns and the key-tuple used when
/// collapsing duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<String>,
    /// Empty means "every column is part of the key".
    #[serde(default)]
    pub key_columns: Vec<String>,
}

impl TableSpec {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: owned(columns),
            key_columns: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.key_columns = owned(keys);
        self
    }

    pub fn keys(&self) -> &[String] {
        if self.key_columns.is_empty() {
            &self.columns
        } else {
            &self.key_columns
        }
    }
}

/// Column selection and table layout shared by the reader, splitter and
/// store. Built once per run and handed around by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Source columns to read, in declaration order.
    pub selected_columns: Vec<String>,
    /// Static fact columns; discovered count columns are appended per batch.
    pub fact: TableSpec,
    pub dimensions: Vec<TableSpec>,
    /// Header prefixes selected even when not listed (per-year count columns).
    pub discovered_prefixes: Vec<String>,
    pub type_rules: TypeRules,
}

impl Catalog {
    /// Catalog for the higher-education census course extracts
    /// (`MICRODADOS_CADASTRO_CURSOS_<year>.CSV`).
    pub fn census() -> Self {
        let selected_columns = owned(&[
            "NU_ANO_CENSO",
            "NO_REGIAO",
            "CO_REGIAO",
            "NO_UF",
            "SG_UF",
            "CO_UF",
            "NO_MUNICIPIO",
            "CO_MUNICIPIO",
            "TP_ORGANIZACAO_ACADEMICA",
            "TP_REDE",
            "TP_CATEGORIA_ADMINISTRATIVA",
            "CO_IES",
            "NO_CURSO",
            "CO_CURSO",
            "NO_CINE_ROTULO",
            "CO_CINE_ROTULO",
            "CO_CINE_AREA_GERAL",
            "NO_CINE_AREA_GERAL",
            "CO_CINE_AREA_ESPECIFICA",
            "NO_CINE_AREA_ESPECIFICA",
            "CO_CINE_AREA_DETALHADA",
            "NO_CINE_AREA_DETALHADA",
            "TP_GRAU_ACADEMICO",
            "IN_GRATUITO",
            "TP_MODALIDADE_ENSINO",
            "TP_NIVEL_ACADEMICO",
        ]);

        let fact = TableSpec::new(
            "microdados",
            &[
                "NU_ANO_CENSO",
                "CO_REGIAO",
                "CO_UF",
                "CO_MUNICIPIO",
                "CO_IES",
                "CO_CURSO",
            ],
        );

        let dimensions = vec![
            TableSpec::new("regioes", &["CO_REGIAO", "NO_REGIAO"]),
            TableSpec::new("ufs", &["CO_UF", "SG_UF", "NO_UF", "CO_REGIAO"]),
            TableSpec::new("municipios", &["CO_MUNICIPIO", "NO_MUNICIPIO", "CO_UF"]),
            TableSpec::new(
                "ies",
                &[
                    "CO_IES",
                    "TP_ORGANIZACAO_ACADEMICA",
                    "TP_REDE",
                    "TP_CATEGORIA_ADMINISTRATIVA",
                ],
            ),
            TableSpec::new(
                "cursos",
                &[
                    "CO_CURSO",
                    "NO_CURSO",
                    "CO_IES",
                    "CO_CINE_ROTULO",
                    "TP_GRAU_ACADEMICO",
                    "IN_GRATUITO",
                    "TP_MODALIDADE_ENSINO",
                    "TP_NIVEL_ACADEMICO",
                ],
            ),
            TableSpec::new(
                "cine_rotulos",
                &["CO_CINE_ROTULO", "NO_CINE_ROTULO", "CO_CINE_AREA_DETALHADA"],
            ),
            TableSpec::new(
                "cine_areas_gerais",
                &["CO_CINE_AREA_GERAL", "NO_CINE_AREA_GERAL"],
            ),
            TableSpec::new(
                "cine_areas_especificas",
                &[
                    "CO_CINE_AREA_ESPECIFICA",
                    "NO_CINE_AREA_ESPECIFICA",
                    "CO_CINE_AREA_GERAL",
                ],
            ),
            TableSpec::new(
                "cine_areas_detalhadas",
                &[
                    "CO_CINE_AREA_DETALHADA",
                    "NO_CINE_AREA_DETALHADA",
                    "CO_CINE_AREA_ESPECIFICA",
                ],
            ),
        ];

        Self {
            selected_columns,
            fact,
            dimensions,
            discovered_prefixes: owned(&["QT_ING", "QT_CONC"]),
            type_rules: TypeRules::census(),
        }
    }

    /// Load a catalog from YAML and validate it.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening catalog {}", path.display()))?;
        let catalog: Catalog = serde_yaml::from_reader(file)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Structural checks for catalogs that did not come from `census()`.
    pub fn validate(&self) -> Result<(), LoadError> {
        let mut names = HashSet::new();
        for table in self.tables() {
            if table.name.trim().is_empty() {
                return Err(LoadError::Config("table with empty name".into()));
            }
            if !names.insert(table.name.as_str()) {
                return Err(LoadError::Config(format!(
                    "table `{}` declared twice",
                    table.name
                )));
            }
            if table.columns.is_empty() {
                return Err(LoadError::Config(format!(
                    "table `{}` has no columns",
                    table.name
                )));
            }
            if let Some(key) = table.keys().iter().find(|k| !table.columns.contains(k)) {
                return Err(LoadError::Config(format!(
                    "table `{}` key column `{}` is not one of its columns",
                    table.name, key
                )));
            }
        }
        Ok(())
    }

    pub fn is_discovered(&self, column: &str) -> bool {
        self.discovered_prefixes
            .iter()
            .any(|prefix| column.starts_with(prefix.as_str()))
    }

    /// Fact table first, then dimensions in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        std::iter::once(&self.fact).chain(self.dimensions.iter())
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables().find(|t| t.name == name)
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

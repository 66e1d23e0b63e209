// src/catalog/types.rs

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage class of a source column, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Labels (`NO_*`, `SG_*`).
    Text,
    /// 0/1 indicators (`IN_*`).
    Flag,
    /// Enrollment and graduate counts (`QT_*`).
    Count,
    /// Identifiers and category codes; the fallback.
    Code,
}

impl ColumnKind {
    /// Map a column kind to the Arrow type the typed batch carries.
    ///
    /// - Text  → Utf8
    /// - Flag  → Int8
    /// - Count → Int32
    /// - Code  → Int64
    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnKind::Text => DataType::Utf8,
            ColumnKind::Flag => DataType::Int8,
            ColumnKind::Count => DataType::Int32,
            ColumnKind::Code => DataType::Int64,
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, ColumnKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub kind: ColumnKind,
}

impl PrefixRule {
    pub fn new(prefix: &str, kind: ColumnKind) -> Self {
        Self {
            prefix: prefix.to_string(),
            kind,
        }
    }
}

/// Name-convention typing: explicit overrides win, then the first matching
/// prefix, then `default_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRules {
    pub prefixes: Vec<PrefixRule>,
    #[serde(default)]
    pub overrides: BTreeMap<String, ColumnKind>,
    #[serde(default = "default_kind")]
    pub default_kind: ColumnKind,
}

fn default_kind() -> ColumnKind {
    ColumnKind::Code
}

impl TypeRules {
    /// Rules for the higher-education census extracts.
    pub fn census() -> Self {
        let mut overrides = BTreeMap::new();
        // CINE labels are alphanumeric ("0114P01") despite the CO_ prefix.
        overrides.insert("CO_CINE_ROTULO".to_string(), ColumnKind::Text);

        Self {
            prefixes: vec![
                PrefixRule::new("NO_", ColumnKind::Text),
                PrefixRule::new("SG_", ColumnKind::Text),
                PrefixRule::new("IN_", ColumnKind::Flag),
                PrefixRule::new("QT_", ColumnKind::Count),
            ],
            overrides,
            default_kind: ColumnKind::Code,
        }
    }

    pub fn kind_of(&self, column: &str) -> ColumnKind {
        if let Some(kind) = self.overrides.get(column) {
            return *kind;
        }
        self.prefixes
            .iter()
            .find(|rule| column.starts_with(&rule.prefix))
            .map(|rule| rule.kind)
            .unwrap_or(self.default_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_drive_column_kinds() {
        let rules = TypeRules::census();
        assert_eq!(rules.kind_of("NO_REGIAO"), ColumnKind::Text);
        assert_eq!(rules.kind_of("SG_UF"), ColumnKind::Text);
        assert_eq!(rules.kind_of("IN_GRATUITO"), ColumnKind::Flag);
        assert_eq!(rules.kind_of("QT_ING_FEM"), ColumnKind::Count);
        assert_eq!(rules.kind_of("CO_MUNICIPIO"), ColumnKind::Code);
        assert_eq!(rules.kind_of("NU_ANO_CENSO"), ColumnKind::Code);
    }

    #[test]
    fn overrides_beat_prefixes() {
        let rules = TypeRules::census();
        assert_eq!(rules.kind_of("CO_CINE_ROTULO"), ColumnKind::Text);
        assert_eq!(ColumnKind::Text.arrow_type(), DataType::Utf8);
        assert_eq!(ColumnKind::Count.arrow_type(), DataType::Int32);
    }
}

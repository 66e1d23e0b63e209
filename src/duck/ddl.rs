// src/duck/ddl.rs

use arrow::datatypes::{DataType, Field, Schema};

use crate::error::LoadError;

/// A column as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
}

impl ColumnDef {
    pub fn from_field(field: &Field) -> Result<Self, LoadError> {
        Ok(Self {
            name: field.name().clone(),
            sql_type: sql_type(field)?.to_string(),
        })
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Map an Arrow field to the DuckDB column type used on creation.
///
/// - Utf8    → VARCHAR
/// - Int8    → TINYINT
/// - Int16   → SMALLINT
/// - Int32   → INTEGER
/// - Int64   → BIGINT
/// - Float64 → DOUBLE
/// - Boolean → BOOLEAN
pub fn sql_type(field: &Field) -> Result<&'static str, LoadError> {
    match field.data_type() {
        DataType::Utf8 => Ok("VARCHAR"),
        DataType::Int8 => Ok("TINYINT"),
        DataType::Int16 => Ok("SMALLINT"),
        DataType::Int32 => Ok("INTEGER"),
        DataType::Int64 => Ok("BIGINT"),
        DataType::Float64 => Ok("DOUBLE"),
        DataType::Boolean => Ok("BOOLEAN"),
        other => Err(LoadError::UnsupportedType {
            column: field.name().clone(),
            data_type: other.to_string(),
        }),
    }
}

pub fn schema_columns(schema: &Schema) -> Result<Vec<ColumnDef>, LoadError> {
    schema
        .fields()
        .iter()
        .map(|f| ColumnDef::from_field(f))
        .collect()
}

pub fn create_table_sql(table: &str, columns: &[ColumnDef]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        cols.join(", ")
    )
}

pub fn add_column_sql(table: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(&column.name),
        column.sql_type
    )
}

/// Keep the earliest-inserted row of every key group.
pub fn dedup_sql(table: &str, keys: &[String]) -> String {
    let table = quote_ident(table);
    let group: Vec<String> = keys.iter().map(|k| quote_ident(k)).collect();
    format!(
        "DELETE FROM {table} WHERE rowid NOT IN (SELECT MIN(rowid) FROM {table} GROUP BY {})",
        group.join(", ")
    )
}

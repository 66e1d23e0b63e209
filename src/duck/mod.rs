// src/duck/mod.rs

pub mod ddl;
pub mod dedup;

pub use ddl::ColumnDef;
pub use dedup::DedupOutcome;

use anyhow::{anyhow, Context, Result};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, Schema,
};
use arrow::record_batch::RecordBatch;
use duckdb::{appender_params_from_iter, params, types::Value, Connection};
use std::{collections::HashMap, path::Path};
use tracing::{debug, info};

use crate::config::SchemaPolicy;
use crate::error::LoadError;
use ddl::{add_column_sql, create_table_sql, quote_ident, schema_columns};

/// Append-only table store on top of a DuckDB connection.
///
/// Tables are created from the first batch written to them. Later batches
/// are checked against the existing columns according to `SchemaPolicy`.
pub struct Store {
    conn: Connection,
    policy: SchemaPolicy,
    /// table → columns in table order, filled lazily from the catalog.
    tables: HashMap<String, Vec<ColumnDef>>,
}

impl Store {
    /// Open a DuckDB database on disk at `path`, creating the file if it
    /// doesn't exist. `:memory:` opens an in-memory database.
    pub fn open(path: impl AsRef<Path>, policy: SchemaPolicy) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::in_memory(policy);
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening DuckDB at {}", path.display()))?;
        Ok(Self::from_connection(conn, policy))
    }

    pub fn in_memory(policy: SchemaPolicy) -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory DuckDB")?;
        Ok(Self::from_connection(conn, policy))
    }

    pub fn from_connection(conn: Connection, policy: SchemaPolicy) -> Self {
        Self {
            conn,
            policy,
            tables: HashMap::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn policy(&self) -> SchemaPolicy {
        self.policy
    }

    /// Columns of `table` in table order, or `None` if it does not exist.
    pub fn table_columns(&mut self, table: &str) -> Result<Option<Vec<ColumnDef>>> {
        if let Some(cols) = self.tables.get(table) {
            return Ok(Some(cols.clone()));
        }

        let mut stmt = self.conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
        )?;
        let cols = stmt
            .query_map(params![table], |row| {
                Ok(ColumnDef {
                    name: row.get(0)?,
                    sql_type: row.get(1)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("reading columns of {}", table))?;

        if cols.is_empty() {
            return Ok(None);
        }
        self.tables.insert(table.to_string(), cols.clone());
        Ok(Some(cols))
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let n: i64 = self
            .conn
            .query_row(&sql, [], |r| r.get(0))
            .with_context(|| format!("counting rows of {}", table))?;
        Ok(n as u64)
    }

    /// Append every row of `batch` to `table`, creating the table on first
    /// use. The whole append (including any DDL) is one transaction.
    pub fn append(&mut self, table: &str, batch: &RecordBatch) -> Result<usize> {
        if batch.num_rows() == 0 {
            return Ok(0);
        }

        let schema = batch.schema();
        let (ddl, columns) = match self.table_columns(table)? {
            None => {
                let cols = schema_columns(&schema)?;
                (vec![create_table_sql(table, &cols)], cols)
            }
            Some(existing) => self.reconcile(table, &schema, existing)?,
        };

        // batch column feeding each table column; None writes NULL
        let sources: Vec<Option<usize>> = columns
            .iter()
            .map(|c| schema.index_of(&c.name).ok())
            .collect();

        let tx = self.conn.transaction()?;
        for stmt in &ddl {
            tx.execute_batch(stmt)
                .with_context(|| format!("running `{}`", stmt))?;
        }
        {
            let mut appender = tx
                .appender(table)
                .with_context(|| format!("creating appender for {}", table))?;
            for row in 0..batch.num_rows() {
                let values = sources
                    .iter()
                    .map(|src| match src {
                        Some(idx) => cell_value(batch.column(*idx).as_ref(), row),
                        None => Ok(Value::Null),
                    })
                    .collect::<Result<Vec<Value>>>()?;
                appender
                    .append_row(appender_params_from_iter(values))
                    .with_context(|| format!("appending row {} to {}", row, table))?;
            }
            appender.flush()?;
        }
        tx.commit()
            .with_context(|| format!("committing append to {}", table))?;

        if !ddl.is_empty() {
            info!(table = %table, columns = columns.len(), ddl = ddl.len(), "table schema written");
        }
        self.tables.insert(table.to_string(), columns);
        debug!(table = %table, rows = batch.num_rows(), "appended");
        Ok(batch.num_rows())
    }

    /// Compare an incoming batch with an existing table. Returns the DDL to
    /// run first and the table's column list after it ran.
    fn reconcile(
        &self,
        table: &str,
        schema: &Schema,
        existing: Vec<ColumnDef>,
    ) -> Result<(Vec<String>, Vec<ColumnDef>)> {
        let incoming = schema_columns(schema)?;
        let mismatch = |detail: String| LoadError::SchemaMismatch {
            table: table.to_string(),
            detail,
        };

        for col in &incoming {
            if let Some(have) = existing.iter().find(|e| e.name == col.name) {
                if !have.sql_type.eq_ignore_ascii_case(&col.sql_type) {
                    return Err(mismatch(format!(
                        "column {} is {} in the table but {} in the batch",
                        col.name, have.sql_type, col.sql_type
                    ))
                    .into());
                }
            }
        }

        let added: Vec<ColumnDef> = incoming
            .iter()
            .filter(|c| !existing.iter().any(|e| e.name == c.name))
            .cloned()
            .collect();
        let absent: Vec<&str> = existing
            .iter()
            .filter(|e| !incoming.iter().any(|c| c.name == e.name))
            .map(|e| e.name.as_str())
            .collect();

        match self.policy {
            SchemaPolicy::Reject => {
                if !added.is_empty() || !absent.is_empty() {
                    let new_names: Vec<&str> = added.iter().map(|c| c.name.as_str()).collect();
                    return Err(mismatch(format!(
                        "new columns {:?}, absent columns {:?}",
                        new_names, absent
                    ))
                    .into());
                }
                Ok((Vec::new(), existing))
            }
            SchemaPolicy::Extend => {
                let ddl = added.iter().map(|c| add_column_sql(table, c)).collect();
                let mut columns = existing;
                columns.extend(added);
                Ok((ddl, columns))
            }
        }
    }
}

/// Read one cell of an Arrow array as a DuckDB value.
fn cell_value(array: &dyn Array, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::Int8 => Value::TinyInt(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => Value::SmallInt(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => Value::BigInt(array.as_primitive::<Int64Type>().value(row)),
        DataType::Float64 => Value::Double(array.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        other => return Err(anyhow!("cannot store Arrow type {}", other)),
    };
    Ok(value)
}

// src/duck/dedup.rs

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, error, info};

use super::ddl::dedup_sql;
use super::Store;
use crate::catalog::Catalog;

/// Result of collapsing one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupOutcome {
    pub table: String,
    /// Rows deleted; `None` when the pass failed.
    pub removed: Option<usize>,
    pub error: Option<String>,
}

impl Store {
    /// Keep one row per distinct `keys` tuple in `table`, the earliest
    /// inserted. Missing tables are left alone. Running it again removes
    /// nothing.
    pub fn deduplicate(&mut self, table: &str, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            bail!("no key columns given for {}", table);
        }
        let Some(columns) = self.table_columns(table)? else {
            debug!(table = %table, "table never written, nothing to deduplicate");
            return Ok(0);
        };
        if let Some(key) = keys.iter().find(|k| !columns.iter().any(|c| &c.name == *k)) {
            bail!("key column {} is not a column of {}", key, table);
        }

        let sql = dedup_sql(table, keys);
        let tx = self.conn.transaction()?;
        let removed = tx
            .execute(&sql, [])
            .with_context(|| format!("removing duplicates from {}", table))?;
        tx.commit()
            .with_context(|| format!("committing deduplication of {}", table))?;

        info!(table = %table, removed, "removed duplicates");
        Ok(removed)
    }

    /// Deduplicate the fact table and every dimension. A failing table is
    /// logged and recorded; the remaining tables are still processed.
    pub fn deduplicate_catalog(&mut self, catalog: &Catalog) -> Vec<DedupOutcome> {
        catalog
            .tables()
            .map(|spec| match self.deduplicate(&spec.name, spec.keys()) {
                Ok(removed) => DedupOutcome {
                    table: spec.name.clone(),
                    removed: Some(removed),
                    error: None,
                },
                Err(e) => {
                    error!(table = %spec.name, "error removing duplicates: {:#}", e);
                    DedupOutcome {
                        table: spec.name.clone(),
                        removed: None,
                        error: Some(format!("{:#}", e)),
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableSpec;
    use crate::config::SchemaPolicy;
    use crate::duck::tests::ies_batch;

    fn keys(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn earliest_row_per_key_survives() -> Result<()> {
        let mut store = Store::in_memory(SchemaPolicy::Reject)?;
        store.append("ies", &ies_batch(vec![1, 2, 1], vec![1, 1, 2]))?;
        store.append("ies", &ies_batch(vec![2, 3], vec![9, 1]))?;

        let removed = store.deduplicate("ies", &keys(&["CO_IES"]))?;
        assert_eq!(removed, 2);

        let mut stmt = store
            .connection()
            .prepare("SELECT CO_IES, TP_REDE FROM ies ORDER BY CO_IES")?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<duckdb::Result<_>>()?;
        assert_eq!(rows, vec![(1, 1), (2, 1), (3, 1)]);
        Ok(())
    }

    #[test]
    fn second_pass_is_a_no_op() -> Result<()> {
        let mut store = Store::in_memory(SchemaPolicy::Reject)?;
        store.append("ies", &ies_batch(vec![5, 5, 5, 6], vec![1, 1, 1, 2]))?;
        let all = keys(&["CO_IES", "TP_REDE"]);

        assert_eq!(store.deduplicate("ies", &all)?, 2);
        assert_eq!(store.deduplicate("ies", &all)?, 0);
        assert_eq!(store.row_count("ies")?, 2);

        let groups: i64 = store.connection().query_row(
            "SELECT COUNT(*) FROM (SELECT CO_IES, TP_REDE, COUNT(*) AS n FROM ies \
             GROUP BY CO_IES, TP_REDE HAVING n > 1)",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(groups, 0);
        Ok(())
    }

    #[test]
    fn missing_table_is_skipped() -> Result<()> {
        let mut store = Store::in_memory(SchemaPolicy::Reject)?;
        assert_eq!(store.deduplicate("regioes", &keys(&["CO_REGIAO"]))?, 0);
        Ok(())
    }

    #[test]
    fn one_failing_table_does_not_stop_the_rest() -> Result<()> {
        let mut store = Store::in_memory(SchemaPolicy::Reject)?;
        store.append("ies", &ies_batch(vec![1, 1], vec![1, 1]))?;
        store.append("broken", &ies_batch(vec![1], vec![1]))?;

        let mut catalog = Catalog::census();
        catalog.dimensions.insert(
            0,
            TableSpec::new("broken", &["CO_IES", "NOT_THERE"]),
        );
        let ies = catalog
            .dimensions
            .iter_mut()
            .find(|d| d.name == "ies")
            .unwrap();
        ies.key_columns = keys(&["CO_IES"]);

        let outcomes = store.deduplicate_catalog(&catalog);
        let broken = outcomes.iter().find(|o| o.table == "broken").unwrap();
        assert!(broken.error.is_some());
        let ies = outcomes.iter().find(|o| o.table == "ies").unwrap();
        assert_eq!(ies.removed, Some(1));
        Ok(())
    }
}

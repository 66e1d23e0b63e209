// src/process/split.rs

use anyhow::{Context, Result};
use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};
use std::collections::HashSet;
use tracing::trace;

use crate::catalog::{Catalog, TableSpec};

/// Rows destined for one table.
#[derive(Debug, Clone)]
pub struct Projection {
    pub table: String,
    pub batch: RecordBatch,
}

/// Everything one typed batch contributes to the store.
#[derive(Debug, Default)]
pub struct BatchSplit {
    pub fact: Option<Projection>,
    pub dimensions: Vec<Projection>,
    /// Tables left out because the batch lacks some of their columns.
    pub skipped: Vec<String>,
}

impl BatchSplit {
    /// Fact projection first, then dimensions.
    pub fn projections(&self) -> impl Iterator<Item = &Projection> {
        self.fact.iter().chain(self.dimensions.iter())
    }
}

/// Split a typed batch into the fact projection and every dimension whose
/// columns are all present. Dimension rows are made distinct within the
/// batch only.
pub fn split_batch(batch: &RecordBatch, catalog: &Catalog) -> Result<BatchSplit> {
    let schema = batch.schema();
    let mut split = BatchSplit::default();

    match fact_columns(&schema, catalog) {
        Some(cols) => {
            split.fact = Some(Projection {
                table: catalog.fact.name.clone(),
                batch: project(batch, &cols)?,
            });
        }
        None => split.skipped.push(catalog.fact.name.clone()),
    }

    for dim in &catalog.dimensions {
        if !has_all_columns(&schema, dim) {
            trace!(table = %dim.name, "columns absent, skipping dimension");
            split.skipped.push(dim.name.clone());
            continue;
        }
        let projected = project(batch, &dim.columns)?;
        let distinct = distinct_rows(&projected)
            .with_context(|| format!("deduplicating {} within batch", dim.name))?;
        split.dimensions.push(Projection {
            table: dim.name.clone(),
            batch: distinct,
        });
    }

    Ok(split)
}

/// Static fact columns followed by the batch's discovered count columns, or
/// `None` when a static column is absent.
pub fn fact_columns(schema: &Schema, catalog: &Catalog) -> Option<Vec<String>> {
    if !has_all_columns(schema, &catalog.fact) {
        return None;
    }
    let mut cols = catalog.fact.columns.clone();
    let discovered: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| f.name())
        .filter(|name| catalog.is_discovered(name) && !cols.contains(*name))
        .cloned()
        .collect();
    cols.extend(discovered);
    Some(cols)
}

fn has_all_columns(schema: &Schema, table: &TableSpec) -> bool {
    table
        .columns
        .iter()
        .all(|c| schema.column_with_name(c).is_some())
}

fn project(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let indices = columns
        .iter()
        .map(|c| schema.index_of(c))
        .collect::<Result<Vec<_>, _>>()
        .context("resolving projection columns")?;
    batch.project(&indices).context("projecting batch")
}

/// Keep the first occurrence of every distinct row, preserving order.
pub fn distinct_rows(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_rows() < 2 {
        return Ok(batch.clone());
    }

    let fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(fields)?;
    let rows = converter.convert_columns(batch.columns())?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let keep: Vec<bool> = rows.iter().map(|row| seen.insert(row)).collect();
    if keep.iter().all(|k| *k) {
        return Ok(batch.clone());
    }
    let mask = BooleanArray::from(keep);
    Ok(filter_record_batch(batch, &mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, AsArray, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Int64Type};
    use std::sync::Arc;

    fn census_batch(with_counts: bool) -> RecordBatch {
        let mut fields = vec![
            Field::new("NU_ANO_CENSO", DataType::Int64, false),
            Field::new("CO_REGIAO", DataType::Int64, false),
            Field::new("NO_REGIAO", DataType::Utf8, false),
            Field::new("CO_UF", DataType::Int64, false),
            Field::new("CO_MUNICIPIO", DataType::Int64, false),
            Field::new("CO_IES", DataType::Int64, false),
            Field::new("CO_CURSO", DataType::Int64, false),
        ];
        let mut cols: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![2023, 2023, 2023])),
            Arc::new(Int64Array::from(vec![3, 3, 5])),
            Arc::new(StringArray::from(vec!["Sudeste", "Sudeste", "Centro-Oeste"])),
            Arc::new(Int64Array::from(vec![35, 35, 53])),
            Arc::new(Int64Array::from(vec![3550308, 3550308, 5300108])),
            Arc::new(Int64Array::from(vec![1, 1, 2])),
            Arc::new(Int64Array::from(vec![10, 11, 20])),
        ];
        if with_counts {
            fields.push(Field::new("QT_ING_FEM", DataType::Int32, false));
            cols.push(Arc::new(Int32Array::from(vec![4, 5, 6])));
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).unwrap()
    }

    #[test]
    fn discovered_counts_join_the_fact_projection() -> Result<()> {
        let catalog = Catalog::census();
        let split = split_batch(&census_batch(true), &catalog)?;

        let fact = split.fact.expect("fact projection");
        assert_eq!(fact.table, "microdados");
        let names: Vec<String> = fact
            .batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names.len(), 7);
        assert_eq!(names.last().unwrap(), "QT_ING_FEM");
        // facts are not made distinct within a batch
        assert_eq!(fact.batch.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn dimensions_with_missing_columns_are_skipped() -> Result<()> {
        let catalog = Catalog::census();
        let split = split_batch(&census_batch(false), &catalog)?;

        let tables: Vec<&str> = split.dimensions.iter().map(|p| p.table.as_str()).collect();
        assert_eq!(tables, vec!["regioes"]);
        assert!(split.skipped.contains(&"ufs".to_string()));
        assert!(split.skipped.contains(&"cursos".to_string()));
        assert_eq!(split.projections().count(), 2);
        Ok(())
    }

    #[test]
    fn dimension_rows_are_distinct_within_batch() -> Result<()> {
        let split = split_batch(&census_batch(false), &Catalog::census())?;
        let regions = &split.dimensions[0].batch;
        assert_eq!(regions.num_rows(), 2);
        let codes = regions.column(0).as_primitive::<Int64Type>();
        assert_eq!(codes.values().to_vec(), vec![3, 5]);
        assert_eq!(regions.column(1).as_string::<i32>().value(1), "Centro-Oeste");
        Ok(())
    }

    #[test]
    fn missing_fact_key_skips_fact() -> Result<()> {
        let batch = census_batch(false).project(&[0, 1, 2])?;
        let split = split_batch(&batch, &Catalog::census())?;
        assert!(split.fact.is_none());
        assert!(split.skipped.contains(&"microdados".to_string()));
        Ok(())
    }
}

use crate::catalog::ColumnKind;
use crate::process::plan::ReadPlan;
use crate::process::utils::{clean_str, is_missing};
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{
        Array, ArrayRef, AsArray, BooleanArray, Int32Builder, Int64Builder, Int8Builder,
        StringArray,
    },
    compute::filter_record_batch,
    record_batch::RecordBatch,
};
use std::str::FromStr;
use std::sync::Arc;

/// Drop every row with a missing value in any column.
/// Returns the surviving rows and how many were dropped.
pub fn drop_incomplete_rows(batch: &RecordBatch) -> Result<(RecordBatch, usize)> {
    let mut keep = vec![true; batch.num_rows()];

    for (col, field) in batch.columns().iter().zip(batch.schema().fields()) {
        let strings = col
            .as_string_opt::<i32>()
            .ok_or_else(|| anyhow!("raw column {} is not Utf8", field.name()))?;
        for (row, value) in strings.iter().enumerate() {
            if keep[row] && is_missing(value) {
                keep[row] = false;
            }
        }
    }

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped == 0 {
        return Ok((batch.clone(), 0));
    }
    let mask = BooleanArray::from(keep);
    let kept = filter_record_batch(batch, &mask).context("filtering incomplete rows")?;
    Ok((kept, dropped))
}

/// Convert raw string columns into their planned types. Expects a batch that
/// already went through `drop_incomplete_rows`; any value that fails to parse
/// is an error naming the column and row.
pub fn convert_to_final_types(batch: &RecordBatch, plan: &ReadPlan) -> Result<RecordBatch> {
    if batch.num_columns() != plan.columns.len() {
        return Err(anyhow!(
            "batch has {} columns, plan expects {}",
            batch.num_columns(),
            plan.columns.len()
        ));
    }

    let mut out: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (arr, planned) in batch.columns().iter().zip(&plan.columns) {
        let strings = arr
            .as_string_opt::<i32>()
            .ok_or_else(|| anyhow!("raw column {} is not Utf8", planned.name))?;

        let converted: ArrayRef = match planned.kind {
            ColumnKind::Text => Arc::new(StringArray::from_iter_values(
                strings.iter().map(|v| clean_str(v.unwrap_or_default())),
            )),
            ColumnKind::Flag => {
                let mut b = Int8Builder::with_capacity(strings.len());
                for (row, v) in strings.iter().enumerate() {
                    b.append_value(parse_cell(v, &planned.name, row)?);
                }
                Arc::new(b.finish())
            }
            ColumnKind::Count => {
                let mut b = Int32Builder::with_capacity(strings.len());
                for (row, v) in strings.iter().enumerate() {
                    b.append_value(parse_cell(v, &planned.name, row)?);
                }
                Arc::new(b.finish())
            }
            ColumnKind::Code => {
                let mut b = Int64Builder::with_capacity(strings.len());
                for (row, v) in strings.iter().enumerate() {
                    b.append_value(parse_cell(v, &planned.name, row)?);
                }
                Arc::new(b.finish())
            }
        };
        out.push(converted);
    }

    RecordBatch::try_new(plan.typed_schema(), out).context("building typed RecordBatch")
}

fn parse_cell<T: FromStr>(value: Option<&str>, column: &str, row: usize) -> Result<T> {
    let raw = value.ok_or_else(|| anyhow!("column {} row {}: unexpected null", column, row))?;
    let cleaned = clean_str(raw);
    cleaned.parse::<T>().map_err(|_| {
        anyhow!(
            "column {} row {}: cannot parse {:?} as {}",
            column,
            row,
            cleaned,
            std::any::type_name::<T>()
        )
    })
}

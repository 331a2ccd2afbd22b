//! Arrow utility functions for the string tables the pipeline works on
//!
//! Every table handled by the pipeline is all-UTF-8: metadata is read with
//! string columns only, so identifiers such as `0012` keep their exact text.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, StringArray};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rayon::prelude::*;

use crate::error::{Result, TilerError};

/// Borrow a column of `batch` as a `StringArray`
///
/// # Errors
/// Returns a configuration error if the column is missing and a metadata
/// error if it is not a UTF-8 column.
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    let idx = batch.schema().index_of(name).map_err(|_| {
        TilerError::config(format!(
            "Column '{name}' not found; available columns: {}",
            batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;

    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| TilerError::MetadataError(format!("Column '{name}' is not a string array")))
}

/// Non-empty string value of `array` at `index`
#[must_use]
pub fn non_empty_value(array: &StringArray, index: usize) -> Option<&str> {
    if array.is_null(index) {
        return None;
    }
    Some(array.value(index)).filter(|v| !v.is_empty())
}

/// Build an all-UTF-8 record batch from named columns
///
/// All columns must have the same length.
pub fn string_batch(columns: &[(&str, Vec<Option<&str>>)]) -> Result<RecordBatch> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.clone())) as ArrayRef)
        .collect();

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Keep the rows of `batch` where `mask` is true
pub fn filter_record_batch(batch: &RecordBatch, mask: &BooleanArray) -> Result<RecordBatch> {
    if mask.len() != batch.num_rows() {
        return Err(TilerError::ValidationError(format!(
            "Filter mask length {} does not match batch length {}",
            mask.len(),
            batch.num_rows()
        )));
    }

    let filtered_columns: Vec<ArrayRef> = batch
        .columns()
        .par_iter()
        .map(|col| compute::filter(col, mask))
        .collect::<arrow::error::Result<_>>()?;

    Ok(RecordBatch::try_new(batch.schema(), filtered_columns)?)
}

/// Distinct non-null values of a string column, in order of first appearance
pub fn distinct_values(batch: &RecordBatch, name: &str) -> Result<Vec<String>> {
    use itertools::Itertools;

    let column = string_column(batch, name)?;
    Ok((0..column.len())
        .filter_map(|i| non_empty_value(column, i))
        .unique()
        .map(str::to_string)
        .collect())
}

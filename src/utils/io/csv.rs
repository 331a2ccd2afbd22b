//! CSV reading and writing through `arrow::csv`

use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::Result;
use crate::error::util::safe_open_file;
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Rows read per CSV batch
pub const CSV_BATCH_SIZE: usize = 8192;

/// Read a headered CSV file into a single batch with every column as UTF-8
///
/// Column names come from the header; values keep their exact text.
pub fn read_csv_as_strings(path: &Path) -> Result<RecordBatch> {
    let start = Instant::now();
    log_operation_start("Reading CSV file", path);

    let mut file = safe_open_file(path, "CSV table")?;
    let format = Format::default().with_header(true);
    let (inferred, _) = format.infer_schema(BufReader::new(&file), Some(1))?;
    file.rewind()?;

    let schema = Arc::new(Schema::new(
        inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_batch_size(CSV_BATCH_SIZE)
        .build(BufReader::new(file))?;
    let batches = reader.collect::<arrow::error::Result<Vec<_>>>()?;
    let batch = concat_batches(&schema, &batches)?;

    log_operation_complete("read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Write `batch` as a headered CSV file, replacing any existing file
pub fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    log_operation_complete("wrote", path, batch.num_rows(), None);
    Ok(())
}

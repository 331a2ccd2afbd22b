use std::path::Path;

use wsi_tiles::config::PipelineConfig;
use wsi_tiles::utils::test::{test_config, write_metadata_csv};

/// Four samples from two patients, two tissues each
pub const GTEX_ROWS: [(&str, &str, &str); 4] = [
    ("GTEX-1117F-0126", "GTEX-1117F", "Lung"),
    ("GTEX-1117F-0226", "GTEX-1117F", "Liver"),
    ("GTEX-111CU-0126", "GTEX-111CU", "Lung"),
    ("GTEX-111CU-0226", "GTEX-111CU", "Liver"),
];

/// Write `rows` as metadata under `root` and return a matching configuration
pub fn setup(root: &Path, rows: &[(&str, &str, &str)]) -> PipelineConfig {
    let config = test_config(root);
    write_metadata_csv(&config.metadata_csv, rows).expect("metadata written");
    config
}

/// Values of `column` in a CSV written by the pipeline
pub fn csv_column(path: &Path, column: &str) -> Vec<String> {
    let batch = wsi_tiles::utils::io::read_csv_as_strings(path).expect("csv readable");
    let array = wsi_tiles::utils::arrow_utils::string_column(&batch, column).expect("column exists");
    (0..batch.num_rows())
        .filter_map(|i| wsi_tiles::utils::arrow_utils::non_empty_value(array, i))
        .map(str::to_string)
        .collect()
}

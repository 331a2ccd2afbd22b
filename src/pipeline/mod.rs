//! Pipeline driver
//!
//! Runs retrieval, extraction, the metadata join and the patient-wise split
//! strictly in sequence and writes a JSON report next to the split tables.

use std::path::{Path, PathBuf};
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::algorithm::join::{JoinReport, TileIndex, join_tiles_with_metadata};
use crate::algorithm::split::{PatientWiseSplitter, write_split};
use crate::common::RemoteStore;
use crate::config::PipelineConfig;
use crate::error::util::ensure_directory;
use crate::error::Result;
use crate::extraction::{ExtractionReport, MANIFEST_FILE, SlideOutcome, TileExtractor};
use crate::models::{DatasetSplit, PatientAssignment, slide_references};
use crate::retrieval::{HttpStore, RegistryStore, RetrievalReport, SlideRetriever};
use crate::utils::arrow_utils::{distinct_values, string_column};
use crate::utils::io::{read_csv_as_strings, write_atomic};

/// File name of the run report inside the tile directory
pub const REPORT_FILE: &str = "pipeline_report.json";

/// A slide that produced no tiles because it could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideFailure {
    /// Sample id of the slide
    pub slide_id: String,
    /// Why the slide failed
    pub reason: String,
}

/// Extraction counts for the run report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Slides processed
    pub slides: usize,
    /// Tiles written
    pub tiles: usize,
    /// Slides that could not be read
    pub failures: Vec<SlideFailure>,
    /// Slides that yielded fewer tiles than requested
    pub short_slides: Vec<String>,
}

impl ExtractionSummary {
    fn new(report: &ExtractionReport, n_tiles: usize) -> Self {
        Self {
            slides: report.outcomes.len(),
            tiles: report.tile_count(),
            failures: report
                .failures()
                .filter_map(|outcome| match outcome {
                    SlideOutcome::Failed {
                        slide_id, reason, ..
                    } => Some(SlideFailure {
                        slide_id: slide_id.clone(),
                        reason: reason.clone(),
                    }),
                    SlideOutcome::Extracted { .. } => None,
                })
                .collect(),
            short_slides: report.short_slides(n_tiles).map(str::to_string).collect(),
        }
    }
}

/// Split counts and the patient assignment for the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    /// Tiles in the training table
    pub train_tiles: usize,
    /// Tiles in the test table
    pub test_tiles: usize,
    /// Output path of the training table
    pub train_path: PathBuf,
    /// Output path of the test table
    pub test_path: PathBuf,
    /// Patient assignment and strategy
    pub assignment: PatientAssignment,
}

/// Everything that happened during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
    /// Rows in the metadata table
    pub metadata_rows: usize,
    /// Retrieval outcome, absent when retrieval was skipped
    pub retrieval: Option<RetrievalReport>,
    /// Extraction outcome, absent when tiles were indexed from disk
    pub extraction: Option<ExtractionSummary>,
    /// Join outcome
    pub join: JoinReport,
    /// Split outcome
    pub split: SplitSummary,
}

/// Run the whole pipeline with the configured remote store
///
/// Uses the slide registry when one is configured, otherwise the HTTP
/// endpoint at `url_root`.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    let http = HttpStore::new(config.retrieval.timeout_secs)?;
    match &config.retrieval.registry {
        Some(path) => run_with_store(config, &RegistryStore::from_json_file(path, http)?),
        None => run_with_store(config, &http),
    }
}

/// Run the whole pipeline fetching missing slides from `store`
pub fn run_with_store(config: &PipelineConfig, store: &dyn RemoteStore) -> Result<PipelineReport> {
    let started_at = Utc::now();
    let start = Instant::now();
    config.validate()?;

    let metadata = load_metadata(config)?;

    let retrieval = if config.retrieval.skip {
        info!("Retrieval skipped");
        None
    } else {
        let references = slide_references(
            &metadata,
            &config.columns.sample,
            &config.retrieval.url_root,
            &config.wsi_dir,
            &config.retrieval.extension,
        )?;
        let retriever = SlideRetriever::new(&config.wsi_dir, &config.retrieval)?;
        Some(retriever.retrieve(store, &references)?)
    };

    let extraction = TileExtractor::new(config.extraction.clone())?
        .with_threads(config.thread_count())
        .extract_all(&config.wsi_dir, &config.tile_dir)?;

    let (join, split) = join_and_split(config, &metadata, &extraction.tile_index())?;

    finish(config, PipelineReport {
        started_at,
        elapsed_secs: start.elapsed().as_secs_f64(),
        metadata_rows: metadata.num_rows(),
        retrieval,
        extraction: Some(ExtractionSummary::new(&extraction, config.extraction.n_tiles)),
        join,
        split,
    })
}

/// Rebuild the split tables from tiles already on disk
///
/// Tiles come from the manifest when present, otherwise from a scan of the
/// tiles directory resolved against the metadata sample ids.
pub fn resplit_existing_tiles(config: &PipelineConfig) -> Result<PipelineReport> {
    let started_at = Utc::now();
    let start = Instant::now();
    config.validate()?;

    let metadata = load_metadata(config)?;
    let tiles_dir = config.tiles_dir();
    let manifest = tiles_dir.join(MANIFEST_FILE);

    let index = if manifest.is_file() {
        TileIndex::from_manifest(&manifest)?
    } else {
        let known = distinct_values(&metadata, &config.columns.sample)?;
        TileIndex::scan(&tiles_dir, &known)?
    };

    let (join, split) = join_and_split(config, &metadata, &index)?;

    finish(config, PipelineReport {
        started_at,
        elapsed_secs: start.elapsed().as_secs_f64(),
        metadata_rows: metadata.num_rows(),
        retrieval: None,
        extraction: None,
        join,
        split,
    })
}

/// Read the metadata table and check the configured columns exist
fn load_metadata(config: &PipelineConfig) -> Result<RecordBatch> {
    let metadata = read_csv_as_strings(&config.metadata_csv)?;
    for column in [
        &config.columns.sample,
        &config.columns.patient,
        &config.columns.label,
    ] {
        string_column(&metadata, column)?;
    }
    Ok(metadata)
}

fn join_and_split(
    config: &PipelineConfig,
    metadata: &RecordBatch,
    index: &TileIndex,
) -> Result<(JoinReport, SplitSummary)> {
    let joined = join_tiles_with_metadata(index, metadata, &config.columns.sample)?;

    let splitter =
        PatientWiseSplitter::new(&config.columns.patient, &config.columns.label, &config.split)?;
    let split: DatasetSplit = splitter.split(&joined.table)?;

    let (train_path, test_path) = config.split_paths();
    ensure_directory(&config.tile_dir, "split output")?;
    write_split(&split, &train_path, &test_path)?;

    let summary = SplitSummary {
        train_tiles: split.train.num_rows(),
        test_tiles: split.test.num_rows(),
        train_path,
        test_path,
        assignment: split.assignment,
    };
    Ok((joined.report, summary))
}

fn finish(config: &PipelineConfig, report: PipelineReport) -> Result<PipelineReport> {
    let path = config.tile_dir.join(REPORT_FILE);
    write_report(&path, &report)?;
    info!("Run report written to {}", path.display());
    Ok(report)
}

/// Serialize `report` as pretty JSON at `path`
pub fn write_report(path: &Path, report: &PipelineReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    write_atomic(path, &json)
}

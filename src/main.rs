use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use wsi_tiles::config::{PipelineConfig, TileSize};
use wsi_tiles::pipeline;
use wsi_tiles::utils::logging::print_run_summary;

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

/// Build a patient-wise train/test tile dataset from whole-slide images.
///
/// Values given on the command line override the configuration file, which
/// in turn overrides the built-in defaults.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Metadata CSV with one row per slide.
    #[arg(long)]
    metadata: Option<PathBuf>,
    /// Directory where slides are stored.
    #[arg(long)]
    wsi_dir: Option<PathBuf>,
    /// Directory for tiles, split tables and the run report.
    #[arg(long)]
    tile_dir: Option<PathBuf>,
    /// Sample id column.
    #[arg(long)]
    sample_column: Option<String>,
    /// Patient id column.
    #[arg(long)]
    patient_column: Option<String>,
    /// Label column used for stratification.
    #[arg(long)]
    label_column: Option<String>,
    /// Root URL of the slide download service.
    #[arg(long)]
    url_root: Option<String>,
    /// JSON registry of download URLs and checksums per sample.
    #[arg(long)]
    registry: Option<PathBuf>,
    /// Slide file extension, used for downloads and extraction.
    #[arg(long)]
    extension: Option<String>,
    /// Do not download missing slides.
    #[arg(long, default_value_t = false)]
    skip_download: bool,
    /// Minimum politeness delay between downloads, in seconds.
    #[arg(long)]
    delay_min: Option<u64>,
    /// Maximum politeness delay between downloads, in seconds (exclusive).
    #[arg(long)]
    delay_max: Option<u64>,
    /// Tile width in pixels.
    #[arg(long)]
    tile_width: Option<u32>,
    /// Tile height in pixels.
    #[arg(long)]
    tile_height: Option<u32>,
    /// Maximum number of tiles per slide.
    #[arg(long)]
    n_tiles: Option<usize>,
    /// Pyramid level to extract from.
    #[arg(long)]
    level: Option<usize>,
    /// Seed for tile sampling.
    #[arg(long)]
    seed: Option<u64>,
    /// Keep tiles regardless of tissue content.
    #[arg(long, default_value_t = false)]
    no_tissue_check: bool,
    /// Minimum tissue fraction of a kept tile.
    #[arg(long)]
    tissue_threshold: Option<f64>,
    /// Decoding budget per slide in MiB for the raster image backend.
    #[arg(long)]
    max_decode_mib: Option<u64>,
    /// Extract slides in parallel.
    #[arg(long, default_value_t = false)]
    parallel: bool,
    /// Worker threads for parallel extraction.
    #[arg(long)]
    threads: Option<usize>,
    /// Fraction of patients in the test set.
    #[arg(long)]
    test_size: Option<f64>,
    /// Seed for the patient split.
    #[arg(long)]
    split_seed: Option<u64>,
    /// Only rebuild the split tables from tiles already on disk.
    #[arg(long, default_value_t = false)]
    split_only: bool,
}

impl Args {
    /// Apply command line overrides on top of `config`
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.metadata {
            config.metadata_csv.clone_from(path);
        }
        if let Some(dir) = &self.wsi_dir {
            config.wsi_dir.clone_from(dir);
        }
        if let Some(dir) = &self.tile_dir {
            config.tile_dir.clone_from(dir);
        }
        if let Some(column) = &self.sample_column {
            config.columns.sample.clone_from(column);
        }
        if let Some(column) = &self.patient_column {
            config.columns.patient.clone_from(column);
        }
        if let Some(column) = &self.label_column {
            config.columns.label.clone_from(column);
        }
        if let Some(root) = &self.url_root {
            config.retrieval.url_root.clone_from(root);
        }
        if self.registry.is_some() {
            config.retrieval.registry.clone_from(&self.registry);
        }
        if let Some(ext) = &self.extension {
            config.retrieval.extension.clone_from(ext);
            config.extraction.valid_extensions = vec![ext.clone()];
        }
        config.retrieval.skip |= self.skip_download;
        if let Some(min) = self.delay_min {
            config.retrieval.delay_secs.start = min;
        }
        if let Some(max) = self.delay_max {
            config.retrieval.delay_secs.end = max;
        }

        let size = config.extraction.tile_size;
        config.extraction.tile_size = TileSize::new(
            self.tile_width.unwrap_or(size.width),
            self.tile_height.unwrap_or(size.height),
        );
        if let Some(n) = self.n_tiles {
            config.extraction.n_tiles = n;
        }
        if let Some(level) = self.level {
            config.extraction.level = level;
        }
        if let Some(seed) = self.seed {
            config.extraction.seed = seed;
        }
        if self.no_tissue_check {
            config.extraction.check_tissue = false;
        }
        if let Some(threshold) = self.tissue_threshold {
            config.extraction.tissue_threshold = threshold;
        }
        if let Some(mib) = self.max_decode_mib {
            config.extraction.max_decode_mib = mib;
        }
        config.extraction.parallel |= self.parallel;
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if let Some(test_size) = self.test_size {
            config.split.test_size = test_size;
        }
        if let Some(seed) = self.split_seed {
            config.split.seed = seed;
        }
    }
}

fn main() -> Result<()> {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        "Building tile dataset from {} into {}",
        config.metadata_csv.display(),
        config.tile_dir.display()
    );

    let report = if args.split_only {
        pipeline::resplit_existing_tiles(&config).context("Failed to rebuild the split")?
    } else {
        pipeline::run(&config).context("Pipeline failed")?
    };

    print_run_summary(&report);
    Ok(())
}

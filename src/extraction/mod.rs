//! Tile extraction over a directory of slides
//!
//! Every slide is opened, sampled with a generator seeded from the configured
//! seed and its accepted crops are saved as PNG files under `tiles/`. A slide
//! that cannot be read fails on its own; the rest of the batch continues.

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{ImageFormat, RgbImage};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::algorithm::join::TileIndex;
use crate::algorithm::sampler::{RandomTileSampler, SamplerConfig, SamplingOutcome};
use crate::common::{SlideOpener, TissueDetector};
use crate::config::ExtractionConfig;
use crate::error::util::ensure_directory;
use crate::error::{Result, TilerError};
use crate::models::ExtractedTile;
use crate::slide::{ImageSlideOpener, OtsuTissueDetector};
use crate::utils::io::find_files;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar, log_stage_summary};

/// Sub-directory of the output directory holding tile images
pub const TILES_SUBDIR: &str = "tiles";

/// File name of the tile manifest inside the tiles directory
pub const MANIFEST_FILE: &str = "tile_manifest.csv";

/// Result of processing one slide
#[derive(Debug, Clone, PartialEq)]
pub enum SlideOutcome {
    /// Tiles were written for the slide
    Extracted {
        /// Sample id of the slide
        slide_id: String,
        /// Written tiles, in sampling order
        tiles: Vec<ExtractedTile>,
        /// Sampler statistics
        attempts: usize,
        /// Candidates rejected by the tissue check
        rejected: usize,
        /// Whether the rejection budget ran out
        exhausted: bool,
    },
    /// The slide could not be opened or read
    Failed {
        /// Sample id of the slide
        slide_id: String,
        /// Path of the slide file
        path: PathBuf,
        /// Why the slide failed
        reason: String,
    },
}

impl SlideOutcome {
    /// Sample id of the slide
    #[must_use]
    pub fn slide_id(&self) -> &str {
        match self {
            Self::Extracted { slide_id, .. } | Self::Failed { slide_id, .. } => slide_id,
        }
    }
}

/// Per-slide outcomes of one extraction run, ordered by slide file name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    /// One outcome per slide
    pub outcomes: Vec<SlideOutcome>,
    /// Path of the written tile manifest
    pub manifest: PathBuf,
}

impl ExtractionReport {
    /// Every written tile
    pub fn tiles(&self) -> impl Iterator<Item = &ExtractedTile> {
        self.outcomes.iter().flat_map(|outcome| match outcome {
            SlideOutcome::Extracted { tiles, .. } => tiles.as_slice(),
            SlideOutcome::Failed { .. } => [].as_slice(),
        })
    }

    /// Number of written tiles
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles().count()
    }

    /// Slides that failed
    pub fn failures(&self) -> impl Iterator<Item = &SlideOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, SlideOutcome::Failed { .. }))
    }

    /// Slides that produced fewer tiles than requested
    pub fn short_slides(&self, n_tiles: usize) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(move |outcome| match outcome {
            SlideOutcome::Extracted {
                slide_id, tiles, ..
            } if tiles.len() < n_tiles => Some(slide_id.as_str()),
            _ => None,
        })
    }

    /// Index of the written tiles keyed by their explicit slide id
    #[must_use]
    pub fn tile_index(&self) -> TileIndex {
        let tiles: Vec<ExtractedTile> = self.tiles().cloned().collect();
        TileIndex::from_tiles(&tiles)
    }
}

/// Applies the random sampler to every slide of a directory
#[derive(Debug)]
pub struct TileExtractor {
    config: ExtractionConfig,
    sampler: RandomTileSampler,
    opener: Box<dyn SlideOpener>,
    detector: Box<dyn TissueDetector>,
    threads: usize,
}

impl TileExtractor {
    /// Extractor with the default image backend and Otsu tissue detection
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        let opener =
            ImageSlideOpener::new(config.level).with_max_decode_bytes(config.max_decode_bytes());
        Self::with_backends(config, Box::new(opener), Box::new(OtsuTissueDetector::default()))
    }

    /// Extractor with explicit slide and tissue backends
    pub fn with_backends(
        config: ExtractionConfig,
        opener: Box<dyn SlideOpener>,
        detector: Box<dyn TissueDetector>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sampler: RandomTileSampler::new(SamplerConfig::from(&config)),
            config,
            opener,
            detector,
            threads: num_cpus::get(),
        })
    }

    /// Number of worker threads used when `parallel` is set
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Extract tiles from every slide in `slide_dir` into `{output_dir}/tiles`
    ///
    /// # Errors
    /// Fails when the output directory cannot be written; per-slide problems
    /// are reported as `SlideOutcome::Failed` instead.
    pub fn extract_all(&self, slide_dir: &Path, output_dir: &Path) -> Result<ExtractionReport> {
        let start = Instant::now();
        let tiles_dir = output_dir.join(TILES_SUBDIR);
        ensure_directory(&tiles_dir, "tile output")?;

        let slides = find_files(slide_dir, |path| self.config.accepts(path))?;
        info!(
            "Extracting up to {} tiles at level {} from {} slides",
            self.config.n_tiles,
            self.config.level,
            slides.len()
        );

        let pb = create_main_progress_bar(slides.len() as u64, Some("Extracting tiles"));
        let outcomes = if self.config.parallel && slides.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .map_err(|e| TilerError::config(format!("Failed to build thread pool: {e}")))?;
            pool.install(|| {
                slides
                    .par_iter()
                    .map(|path| self.extract_tracked(path, &tiles_dir, &pb))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            slides
                .iter()
                .map(|path| self.extract_tracked(path, &tiles_dir, &pb))
                .collect::<Result<Vec<_>>>()?
        };
        finish_progress_bar(&pb, Some("Extraction complete"));

        let report = ExtractionReport {
            outcomes,
            manifest: tiles_dir.join(MANIFEST_FILE),
        };
        report.tile_index().write_manifest(&report.manifest)?;

        for slide_id in report.short_slides(self.config.n_tiles) {
            warn!("Slide {slide_id} yielded fewer than {} tiles", self.config.n_tiles);
        }
        let failed = report.failures().count();
        log_stage_summary(
            "Extraction",
            report.outcomes.len() - failed,
            failed,
            start.elapsed(),
        );
        info!("Wrote {} tiles to {}", report.tile_count(), tiles_dir.display());

        Ok(report)
    }

    fn extract_tracked(&self, path: &Path, tiles_dir: &Path, pb: &ProgressBar) -> Result<SlideOutcome> {
        let outcome = self.extract_slide(path, tiles_dir);
        pb.inc(1);
        outcome
    }

    /// Extract the tiles of one slide
    ///
    /// Output IO errors are returned; every other failure becomes
    /// `SlideOutcome::Failed`.
    pub fn extract_slide(&self, path: &Path, tiles_dir: &Path) -> Result<SlideOutcome> {
        let slide_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| TilerError::unreadable(path, "path has no file name"))?;

        match self.write_slide_tiles(&slide_id, path, tiles_dir) {
            Ok((tiles, sampling)) => Ok(SlideOutcome::Extracted {
                slide_id,
                tiles,
                attempts: sampling.attempts,
                rejected: sampling.rejected,
                exhausted: sampling.exhausted,
            }),
            Err(e @ TilerError::IoError(_)) => Err(e),
            Err(e) => {
                warn!("Skipping slide {}: {e}", path.display());
                Ok(SlideOutcome::Failed {
                    slide_id,
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn write_slide_tiles(
        &self,
        slide_id: &str,
        path: &Path,
        tiles_dir: &Path,
    ) -> Result<(Vec<ExtractedTile>, SamplingOutcome)> {
        let slide = self.opener.open(path)?;
        debug!("Opened slide {} with {} levels", slide.name(), slide.level_count());
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let sampling = self
            .sampler
            .sample_slide(slide.as_ref(), self.detector.as_ref(), &mut rng)?;

        let mut tiles = Vec::with_capacity(sampling.coordinates.len());
        for (index, coordinate) in sampling.coordinates.iter().enumerate() {
            let region = slide.read_region(coordinate)?;
            let filename = coordinate.filename(slide_id, index);
            let tile_path = tiles_dir.join(&filename);
            save_png(&region, &tile_path)?;
            tiles.push(ExtractedTile {
                slide_id: slide_id.to_string(),
                filename,
                path: tile_path,
                coordinate: *coordinate,
            });
        }
        Ok((tiles, sampling))
    }
}

/// Save a crop as PNG; write failures surface as IO errors
fn save_png(tile: &RgbImage, path: &Path) -> Result<()> {
    tile.save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => TilerError::IoError(io),
            other => TilerError::ImageError(other),
        })
}

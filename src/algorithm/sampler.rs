//! Tissue-filtered random tile sampling
//!
//! Coordinates are drawn uniformly inside the level extent from an explicit,
//! caller-owned generator. Every origin is considered at most once. Candidates
//! failing the tissue check count against a rejection budget; running out of
//! budget yields a short result, not an error.

use log::{debug, warn};
use rand::Rng;
use rustc_hash::FxHashSet;

use crate::common::{SlideReader, TissueDetector};
use crate::config::{ExtractionConfig, TileSize};
use crate::error::{Result, TilerError};
use crate::models::TileCoordinate;

/// Parameters of the random sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Size of every crop
    pub tile_size: TileSize,
    /// Maximum number of accepted coordinates
    pub n_tiles: usize,
    /// Level the coordinates refer to
    pub level: usize,
    /// Whether candidates must pass the tissue check
    pub check_tissue: bool,
    /// Minimum tissue fraction of an accepted candidate
    pub tissue_threshold: f64,
    /// Rejected candidates allowed before sampling stops
    pub max_rejections: usize,
}

impl From<&ExtractionConfig> for SamplerConfig {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            n_tiles: config.n_tiles,
            level: config.level,
            check_tissue: config.check_tissue,
            tissue_threshold: config.tissue_threshold,
            max_rejections: config.max_rejections,
        }
    }
}

/// Result of sampling one slide
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingOutcome {
    /// Accepted coordinates, in draw order
    pub coordinates: Vec<TileCoordinate>,
    /// Distinct candidates considered
    pub attempts: usize,
    /// Candidates rejected by the tissue check
    pub rejected: usize,
    /// Draws that repeated an origin already considered
    pub duplicates: usize,
    /// Whether sampling stopped because the rejection budget ran out
    pub exhausted: bool,
}

/// Draws tile coordinates uniformly at random inside a level extent
#[derive(Debug, Clone)]
pub struct RandomTileSampler {
    config: SamplerConfig,
}

impl RandomTileSampler {
    /// Create a sampler
    #[must_use]
    pub const fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Sampler configuration
    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample up to `n_tiles` distinct coordinates inside a `(width, height)` extent
    ///
    /// `tissue_fraction` is only called when the tissue check is enabled, and
    /// never twice for the same origin. Repeated draws are skipped without
    /// counting as rejections. Sampling also stops once every origin of the
    /// extent has been considered.
    ///
    /// # Errors
    /// Propagates errors returned by `tissue_fraction`.
    pub fn sample<R, F>(
        &self,
        extent: (u32, u32),
        rng: &mut R,
        mut tissue_fraction: F,
    ) -> Result<SamplingOutcome>
    where
        R: Rng,
        F: FnMut(&TileCoordinate) -> Result<f64>,
    {
        let (width, height) = extent;
        let size = self.config.tile_size;
        let mut outcome = SamplingOutcome::default();

        if size.width > width || size.height > height {
            warn!(
                "Level extent {width}x{height} is smaller than tile {}x{}; no tiles sampled",
                size.width, size.height
            );
            return Ok(outcome);
        }

        let (max_x, max_y) = (width - size.width, height - size.height);
        let origins = (u64::from(max_x) + 1) * (u64::from(max_y) + 1);
        let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();

        while outcome.coordinates.len() < self.config.n_tiles {
            if outcome.rejected >= self.config.max_rejections {
                outcome.exhausted = true;
                break;
            }
            if seen.len() as u64 >= origins {
                debug!("All {origins} tile origins considered");
                break;
            }

            let (x, y) = (rng.random_range(0..=max_x), rng.random_range(0..=max_y));
            if !seen.insert((x, y)) {
                outcome.duplicates += 1;
                continue;
            }

            let coordinate = TileCoordinate {
                x,
                y,
                size,
                level: self.config.level,
            };
            outcome.attempts += 1;

            if self.config.check_tissue
                && tissue_fraction(&coordinate)? < self.config.tissue_threshold
            {
                outcome.rejected += 1;
                continue;
            }

            outcome.coordinates.push(coordinate);
        }

        debug!(
            "Sampled {} tiles in {} attempts ({} rejected, {} repeated draws)",
            outcome.coordinates.len(),
            outcome.attempts,
            outcome.rejected,
            outcome.duplicates
        );
        Ok(outcome)
    }

    /// Sample an opened slide, scoring candidates with `detector`
    ///
    /// With the tissue check enabled the detector is first fitted to an
    /// overview of the whole slide, so crops are judged against the slide's
    /// background rather than against each other.
    pub fn sample_slide<R>(
        &self,
        slide: &dyn SlideReader,
        detector: &dyn TissueDetector,
        rng: &mut R,
    ) -> Result<SamplingOutcome>
    where
        R: Rng,
    {
        let level = self.config.level;
        if level >= slide.level_count() {
            return Err(TilerError::ValidationError(format!(
                "Slide {} has {} levels, level {level} requested",
                slide.name(),
                slide.level_count()
            )));
        }
        let extent = slide.level_dimensions(level)?;

        if !self.config.check_tissue {
            return self.sample(extent, rng, |_| Ok(1.0));
        }

        let fitted = detector.for_slide(&slide.overview()?);
        self.sample(extent, rng, |coordinate| {
            let region = slide.read_region(coordinate)?;
            Ok(fitted.tissue_fraction(&region))
        })
    }
}

//! Slide decoding traits
//!
//! The pipeline never decodes slide formats itself. Extraction talks to a
//! `SlideOpener`, which hands back a `SlideReader` for one file, and scores
//! crops with a `TissueDetector`.

use std::fmt::Debug;
use std::path::Path;

use image::RgbImage;

use crate::error::Result;
use crate::models::TileCoordinate;

/// Read access to the pixel levels of one opened slide
pub trait SlideReader {
    /// Name of the slide (file stem)
    fn name(&self) -> &str;

    /// Number of pyramid levels available
    fn level_count(&self) -> usize;

    /// Width and height of `level` in pixels
    ///
    /// # Errors
    /// Returns an error if the level does not exist.
    fn level_dimensions(&self, level: usize) -> Result<(u32, u32)>;

    /// Pixels of the crop described by `coordinate`
    ///
    /// # Errors
    /// Returns an error if the level does not exist or the crop leaves the
    /// level extent.
    fn read_region(&self, coordinate: &TileCoordinate) -> Result<RgbImage>;

    /// Low-resolution image of the whole slide
    ///
    /// # Errors
    /// Returns an error if no level can be read.
    fn overview(&self) -> Result<RgbImage>;
}

/// Opens slide files
pub trait SlideOpener: Debug + Send + Sync {
    /// Open the slide stored at `path`
    ///
    /// # Errors
    /// Returns `TilerError::UnreadableSlide` if the file cannot be decoded.
    fn open(&self, path: &Path) -> Result<Box<dyn SlideReader>>;
}

/// Scores how much of a crop is tissue rather than background
pub trait TissueDetector: Debug + Send + Sync {
    /// Fraction in `[0, 1]` of tissue pixels in `tile`
    fn tissue_fraction(&self, tile: &RgbImage) -> f64;

    /// Detector fitted to one slide, given an overview of the whole slide
    fn for_slide(&self, overview: &RgbImage) -> Box<dyn TissueDetector>;
}

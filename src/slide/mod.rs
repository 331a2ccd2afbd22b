//! Slide decoding backends
//!
//! `ImageSlide` decodes a slide with the `image` crate and emulates a
//! pyramid by repeated 4x downsampling, the level spacing of Aperio SVS files.
//! Only plain raster slides (PNG, JPEG, single-image TIFF) small enough to
//! decode whole are supported; pyramidal whole-slide formats need another
//! `SlideOpener`.

pub mod tissue;

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageError, Limits, RgbImage};

use crate::common::{SlideOpener, SlideReader};
use crate::error::{Result, TilerError};
use crate::models::TileCoordinate;

pub use tissue::{DEFAULT_BACKGROUND_LEVEL, LuminanceTissueDetector, OtsuTissueDetector};

/// Downsample factor between consecutive pyramid levels
pub const LEVEL_DOWNSAMPLE: u32 = 4;

/// Longest side of the overview handed to tissue detectors
pub const OVERVIEW_SIZE: u32 = 1024;

/// Default decoding budget of the `image` backend
pub const DEFAULT_MAX_DECODE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// A slide decoded into memory, holding the pixels of a single level
///
/// Dimensions are known for every emulated level; pixels only for the level
/// the slide was opened at.
#[derive(Debug, Clone)]
pub struct ImageSlide {
    name: String,
    dimensions: Vec<(u32, u32)>,
    level: usize,
    pixels: RgbImage,
}

impl ImageSlide {
    /// Build a slide from its full resolution image, keeping the pixels of `level`
    ///
    /// Levels stop early once a further downsample would be empty; the pixels
    /// of the deepest existing level are kept when `level` is out of range.
    #[must_use]
    pub fn from_image(name: impl Into<String>, base: RgbImage, level: usize) -> Self {
        let mut dimensions = vec![base.dimensions()];
        let mut pixels = base;
        while dimensions.len() <= level {
            let (w, h) = (pixels.width() / LEVEL_DOWNSAMPLE, pixels.height() / LEVEL_DOWNSAMPLE);
            if w == 0 || h == 0 {
                break;
            }
            pixels = imageops::resize(&pixels, w, h, FilterType::Triangle);
            dimensions.push((w, h));
        }

        Self {
            name: name.into(),
            level: dimensions.len() - 1,
            dimensions,
            pixels,
        }
    }

    /// Decode the slide file at `path` within `max_decode_bytes`
    pub fn open(path: &Path, level: usize, max_decode_bytes: u64) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| TilerError::unreadable(path, "path has no file name"))?;

        let metadata = std::fs::metadata(path).map_err(|e| TilerError::unreadable(path, e))?;
        if metadata.len() == 0 {
            return Err(TilerError::unreadable(path, "file is empty"));
        }

        let mut reader = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| TilerError::unreadable(path, e))?;
        let mut limits = Limits::default();
        limits.max_alloc = Some(max_decode_bytes);
        reader.limits(limits);

        let base = reader
            .decode()
            .map_err(|e| match e {
                ImageError::Limits(_) => TilerError::unreadable(
                    path,
                    format!(
                        "{e}; the image backend decodes whole raster slides up to {} MiB",
                        max_decode_bytes / (1024 * 1024)
                    ),
                ),
                other => TilerError::unreadable(path, other),
            })?
            .to_rgb8();

        Ok(Self::from_image(name, base, level))
    }
}

impl SlideReader for ImageSlide {
    fn name(&self) -> &str {
        &self.name
    }

    fn level_count(&self) -> usize {
        self.dimensions.len()
    }

    fn level_dimensions(&self, level: usize) -> Result<(u32, u32)> {
        self.dimensions.get(level).copied().ok_or_else(|| {
            TilerError::ValidationError(format!(
                "Slide {} has {} levels, level {level} requested",
                self.name,
                self.level_count()
            ))
        })
    }

    fn read_region(&self, coordinate: &TileCoordinate) -> Result<RgbImage> {
        if coordinate.level != self.level {
            return Err(TilerError::ValidationError(format!(
                "Slide {} was opened at level {}, level {} requested",
                self.name, self.level, coordinate.level
            )));
        }
        let image = &self.pixels;
        if !coordinate.fits_within(image.width(), image.height()) {
            return Err(TilerError::ValidationError(format!(
                "Region {coordinate:?} exceeds level extent {}x{} of slide {}",
                image.width(),
                image.height(),
                self.name
            )));
        }

        Ok(imageops::crop_imm(
            image,
            coordinate.x,
            coordinate.y,
            coordinate.size.width,
            coordinate.size.height,
        )
        .to_image())
    }

    fn overview(&self) -> Result<RgbImage> {
        let (w, h) = self.pixels.dimensions();
        let longest = w.max(h);
        if longest <= OVERVIEW_SIZE {
            return Ok(self.pixels.clone());
        }
        let scale = |side: u32| {
            (u64::from(side) * u64::from(OVERVIEW_SIZE) / u64::from(longest)).max(1) as u32
        };
        Ok(imageops::thumbnail(&self.pixels, scale(w), scale(h)))
    }
}

/// Opens slides as `ImageSlide`s at a fixed level
#[derive(Debug, Clone, Copy)]
pub struct ImageSlideOpener {
    /// Level whose pixels are kept
    pub level: usize,
    /// Allocation budget for decoding one slide
    pub max_decode_bytes: u64,
}

impl ImageSlideOpener {
    /// Opener keeping `level`, with the default decoding budget
    #[must_use]
    pub const fn new(level: usize) -> Self {
        Self {
            level,
            max_decode_bytes: DEFAULT_MAX_DECODE_BYTES,
        }
    }

    /// Replace the decoding budget
    #[must_use]
    pub const fn with_max_decode_bytes(mut self, bytes: u64) -> Self {
        self.max_decode_bytes = bytes;
        self
    }
}

impl SlideOpener for ImageSlideOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn SlideReader>> {
        Ok(Box::new(ImageSlide::open(path, self.level, self.max_decode_bytes)?))
    }
}

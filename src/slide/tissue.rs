//! Tissue detection heuristics
//!
//! Background in bright-field slides is close to white; tissue is darker.
//! Crops are always scored against a cut-off between tissue and background,
//! never against a split of the crop's own pixels.

use image::imageops;
use image::{GrayImage, RgbImage};

use crate::common::TissueDetector;

/// Gray level from which a pixel counts as background when nothing better is known
pub const DEFAULT_BACKGROUND_LEVEL: u8 = 220;

/// Otsu threshold between tissue and background, fitted once per slide
///
/// `for_slide` computes the threshold over an overview of the whole slide and
/// every crop of that slide is scored against it. The split is only used when
/// its bright class is as light as `background_level`; a slide without visible
/// background keeps `background_level` as the cut-off.
#[derive(Debug, Clone, Copy)]
pub struct OtsuTissueDetector {
    /// Cut-off used before fitting or when the slide shows no background
    pub background_level: u8,
    threshold: Option<u8>,
}

impl Default for OtsuTissueDetector {
    fn default() -> Self {
        Self {
            background_level: DEFAULT_BACKGROUND_LEVEL,
            threshold: None,
        }
    }
}

impl OtsuTissueDetector {
    /// Threshold fitted to the current slide, if any
    #[must_use]
    pub const fn threshold(&self) -> Option<u8> {
        self.threshold
    }

    /// Fit the threshold to `overview`
    #[must_use]
    pub fn fitted(&self, overview: &RgbImage) -> Self {
        let gray = imageops::grayscale(overview);
        let threshold = otsu_split(&histogram(&gray))
            .filter(|split| split.mean_high >= f64::from(self.background_level))
            .map(|split| split.threshold);
        Self {
            background_level: self.background_level,
            threshold,
        }
    }

    fn cut_off(&self) -> u8 {
        self.threshold.unwrap_or(self.background_level)
    }
}

impl TissueDetector for OtsuTissueDetector {
    fn tissue_fraction(&self, tile: &RgbImage) -> f64 {
        fraction_below(tile, self.cut_off())
    }

    fn for_slide(&self, overview: &RgbImage) -> Box<dyn TissueDetector> {
        Box::new(self.fitted(overview))
    }
}

/// Fixed luminance cut-off; pixels darker than `background_level` are tissue
#[derive(Debug, Clone, Copy)]
pub struct LuminanceTissueDetector {
    /// Gray level from which a pixel counts as background
    pub background_level: u8,
}

impl Default for LuminanceTissueDetector {
    fn default() -> Self {
        Self {
            background_level: DEFAULT_BACKGROUND_LEVEL,
        }
    }
}

impl TissueDetector for LuminanceTissueDetector {
    fn tissue_fraction(&self, tile: &RgbImage) -> f64 {
        fraction_below(tile, self.background_level)
    }

    fn for_slide(&self, _overview: &RgbImage) -> Box<dyn TissueDetector> {
        Box::new(*self)
    }
}

fn fraction_below(tile: &RgbImage, cut_off: u8) -> f64 {
    let gray = imageops::grayscale(tile);
    let total = gray.width() as usize * gray.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let tissue = gray.pixels().filter(|p| p.0[0] < cut_off).count();
    tissue as f64 / total as f64
}

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[usize::from(pixel.0[0])] += 1;
    }
    histogram
}

#[derive(Debug, Clone, Copy)]
struct OtsuSplit {
    /// First gray level of the bright class
    threshold: u8,
    /// Mean gray level of the bright class
    mean_high: f64,
}

/// Split maximising the between-class variance; `None` for a single gray level
fn otsu_split(histogram: &[u64; 256]) -> Option<OtsuSplit> {
    let total: u64 = histogram.iter().sum();
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut best: Option<(OtsuSplit, f64)> = None;
    let mut weight_low = 0u64;
    let mut sum_low = 0.0;

    for level in 0..255usize {
        weight_low += histogram[level];
        sum_low += level as f64 * histogram[level] as f64;
        let weight_high = total - weight_low;
        if weight_low == 0 || weight_high == 0 {
            continue;
        }

        let mean_low = sum_low / weight_low as f64;
        let mean_high = (weighted_total - sum_low) / weight_high as f64;
        let variance = weight_low as f64 * weight_high as f64 * (mean_low - mean_high).powi(2);

        if best.is_none_or(|(_, v)| variance > v) {
            let split = OtsuSplit {
                threshold: (level + 1) as u8,
                mean_high,
            };
            best = Some((split, variance));
        }
    }

    best.map(|(split, _)| split)
}

//! Configuration for the tile dataset pipeline.
//!
//! Defaults follow the GTEx workflow: 512x512 tiles at level 2, at most 100
//! tiles per slide, tissue check at 80%, a 20% patient-wise test split.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TilerError};

/// Default root of the GTEx image download service
pub const DEFAULT_URL_ROOT: &str = "https://brd.nci.nih.gov/brd/imagedownload";

/// Width and height of a tile in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSize {
    /// Tile width
    pub width: u32,
    /// Tile height
    pub height: u32,
}

impl TileSize {
    /// Create a tile size
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

/// Configuration for the random tile extraction stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Size of the cropped tiles
    pub tile_size: TileSize,
    /// Maximum number of tiles to extract per slide
    pub n_tiles: usize,
    /// Magnification level from which tiles are extracted
    pub level: usize,
    /// Seed for the per-slide random generator
    pub seed: u64,
    /// Whether a tile must contain enough tissue to be kept
    pub check_tissue: bool,
    /// Minimum tissue fraction of an accepted tile
    pub tissue_threshold: f64,
    /// Rejected candidates allowed before a slide gives up
    pub max_rejections: usize,
    /// Slide file extensions considered for extraction
    pub valid_extensions: Vec<String>,
    /// Process slides on the rayon pool
    pub parallel: bool,
    /// Decoding budget per slide in MiB
    ///
    /// The bundled `image` backend decodes a slide whole, so it only covers
    /// raster slides that fit in this budget. Pyramidal SVS files need a
    /// whole-slide `SlideOpener`.
    pub max_decode_mib: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tile_size: TileSize::default(),
            n_tiles: 100,
            level: 2,
            seed: 7,
            check_tissue: true,
            tissue_threshold: 0.8,
            max_rejections: 10_000,
            valid_extensions: vec!["svs".to_string()],
            parallel: false,
            max_decode_mib: 2048,
        }
    }
}

/// Configuration for the patient-wise split stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of unique patients assigned to the test set
    pub test_size: f64,
    /// Seed for the split generator
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 1234,
        }
    }
}

/// Configuration for slide retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Remote endpoint; the sample id is appended as the last path segment
    pub url_root: String,
    /// Extension of the stored slide files
    pub extension: String,
    /// Politeness delay between network fetches, in seconds
    pub delay_secs: Range<u64>,
    /// HTTP timeout for one fetch, in seconds
    pub timeout_secs: u64,
    /// Skip the retrieval stage entirely
    pub skip: bool,
    /// JSON registry mapping sample ids to download URLs and checksums
    pub registry: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            url_root: DEFAULT_URL_ROOT.to_string(),
            extension: "svs".to_string(),
            delay_secs: 60..100,
            timeout_secs: 600,
            skip: false,
            registry: None,
        }
    }
}

/// Names of the metadata columns the pipeline relies on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Column holding the sample (slide) identifier
    pub sample: String,
    /// Column holding the patient identifier
    pub patient: String,
    /// Column holding the label used for stratification
    pub label: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            sample: "Tissue Sample ID".to_string(),
            patient: "Subject ID".to_string(),
            label: "Tissue".to_string(),
        }
    }
}

/// Configuration for a whole pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// CSV with one metadata row per slide
    pub metadata_csv: PathBuf,
    /// Directory where slides are stored
    pub wsi_dir: PathBuf,
    /// Directory where tiles and split tables are stored
    pub tile_dir: PathBuf,
    /// Worker threads for parallel extraction (defaults to the CPU count)
    pub threads: Option<usize>,
    /// Column names
    pub columns: ColumnConfig,
    /// Retrieval settings
    pub retrieval: RetrievalConfig,
    /// Extraction settings
    pub extraction: ExtractionConfig,
    /// Split settings
    pub split: SplitConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metadata_csv: PathBuf::from("GTEx_AIDP2021.csv"),
            wsi_dir: PathBuf::from("WSI_GTEx"),
            tile_dir: PathBuf::from("tiles_GTEx"),
            threads: None,
            columns: ColumnConfig::default(),
            retrieval: RetrievalConfig::default(),
            extraction: ExtractionConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = crate::error::util::safe_open_file(path, "pipeline configuration")?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(config)
    }

    /// Directory holding the extracted tiles
    #[must_use]
    pub fn tiles_dir(&self) -> PathBuf {
        self.tile_dir.join(crate::extraction::TILES_SUBDIR)
    }

    /// Output paths of the train and test tables
    #[must_use]
    pub fn split_paths(&self) -> (PathBuf, PathBuf) {
        let name = self
            .metadata_csv
            .file_name()
            .map_or_else(|| "metadata.csv".into(), |n| n.to_string_lossy());
        (
            self.tile_dir.join(format!("train_tiles_PW_{name}")),
            self.tile_dir.join(format!("test_tiles_PW_{name}")),
        )
    }

    /// Number of worker threads for parallel stages
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Check that every parameter is usable before any work starts
    pub fn validate(&self) -> Result<()> {
        self.extraction.validate()?;
        self.split.validate()?;
        self.retrieval.validate()?;
        for (role, name) in [
            ("sample", &self.columns.sample),
            ("patient", &self.columns.patient),
            ("label", &self.columns.label),
        ] {
            if name.trim().is_empty() {
                return Err(TilerError::config(format!("{role} column name is empty")));
            }
        }
        Ok(())
    }
}

impl ExtractionConfig {
    /// Check extraction parameters
    pub fn validate(&self) -> Result<()> {
        if self.tile_size.width == 0 || self.tile_size.height == 0 {
            return Err(TilerError::config("tile size must be non-zero"));
        }
        if self.n_tiles == 0 {
            return Err(TilerError::config("n_tiles must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.tissue_threshold) {
            return Err(TilerError::config(format!(
                "tissue threshold must lie in [0, 1], got {}",
                self.tissue_threshold
            )));
        }
        if self.valid_extensions.is_empty() {
            return Err(TilerError::config("at least one slide extension is required"));
        }
        if self.max_decode_mib == 0 {
            return Err(TilerError::config("max_decode_mib must be at least 1"));
        }
        Ok(())
    }

    /// Decoding budget per slide in bytes
    #[must_use]
    pub const fn max_decode_bytes(&self) -> u64 {
        self.max_decode_mib.saturating_mul(1024 * 1024)
    }

    /// Whether a path carries one of the valid slide extensions
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| {
            let ext = ext.to_string_lossy();
            self.valid_extensions
                .iter()
                .any(|valid| valid.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
    }
}

impl SplitConfig {
    /// Check split parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TilerError::config(format!(
                "test_size must lie strictly between 0 and 1, got {}",
                self.test_size
            )));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    /// Check retrieval parameters
    pub fn validate(&self) -> Result<()> {
        if self.delay_secs.start > self.delay_secs.end {
            return Err(TilerError::config(format!(
                "delay range {}..{} is inverted",
                self.delay_secs.start, self.delay_secs.end
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(TilerError::config("slide extension is empty"));
        }
        Ok(())
    }
}

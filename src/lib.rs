//! A Rust library for building leakage-free tile datasets from whole-slide
//! images: slide retrieval, tissue-filtered random tiling, the metadata join
//! and a patient-wise train/test split.

pub mod algorithm;
pub mod common;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod slide;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::{ExtractionConfig, PipelineConfig, RetrievalConfig, SplitConfig, TileSize};
pub use error::{Result, TilerError};
pub use models::{DatasetSplit, ExtractedTile, PatientAssignment, SlideReference, SplitStrategy, TileCoordinate};

// Stages
pub use algorithm::{
    JoinReport, PatientWiseSplitter, RandomTileSampler, SamplerConfig, SamplingOutcome, TileIndex,
    join_tiles_with_metadata,
};
pub use extraction::{ExtractionReport, SlideOutcome, TileExtractor};
pub use pipeline::{PipelineReport, resplit_existing_tiles, run, run_with_store};
pub use retrieval::{HttpStore, RegistryStore, RetrievalReport, SlideRetriever};

// Collaborator traits and their defaults
pub use common::{RemoteStore, SlideOpener, SlideReader, TissueDetector};
pub use slide::{ImageSlide, ImageSlideOpener, LuminanceTissueDetector, OtsuTissueDetector};

// Arrow types
pub use arrow::record_batch::RecordBatch;

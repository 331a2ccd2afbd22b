//! Domain models for the tile dataset pipeline
//!
//! These types carry the slide identity explicitly from retrieval through
//! extraction to the join, so no stage has to recover it from a filename.

pub mod dataset;
pub mod slide;
pub mod tile;

pub use dataset::{DatasetSplit, PatientAssignment, SplitStrategy};
pub use slide::{SlideReference, local_slide_path, slide_references};
pub use tile::{ExtractedTile, TileCoordinate};

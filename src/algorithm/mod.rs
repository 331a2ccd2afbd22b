//! Core algorithms of the tile pipeline
//!
//! Random tile sampling, the metadata join and the patient-wise split.

pub mod join;
pub mod sampler;
pub mod split;

pub use join::{JoinReport, JoinedTiles, MetadataMismatch, TileEntry, TileIndex, join_tiles_with_metadata};
pub use sampler::{RandomTileSampler, SamplerConfig, SamplingOutcome};
pub use split::{InsufficientStratificationGroups, PatientWiseSplitter, test_count, write_split};

//! Test utilities
//!
//! Synthetic slides, metadata tables and an in-memory remote store for
//! exercising the pipeline without network access or real WSI files.

pub mod helpers;

pub use fixtures::{slide_image, slide_png_bytes, write_metadata_csv, write_slide_png};
pub use helpers::{CountingStore, test_config, timed_execution};

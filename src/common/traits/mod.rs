//! Common traits used across the codebase
//!
//! This module defines the seams to the external collaborators of the
//! pipeline: remote storage and slide decoding.

pub mod remote;
pub mod slide;

pub use remote::RemoteStore;
pub use slide::{SlideOpener, SlideReader, TissueDetector};

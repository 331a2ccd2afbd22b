//! Shared traits
//!
//! Interfaces implemented by the slide decoding and retrieval backends and
//! consumed by the pipeline stages.

pub mod traits;

pub use traits::*;

//! Slide references built from metadata rows

use std::path::{Path, PathBuf};

use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::arrow_utils::string_column;

/// A slide known to the pipeline: where it lives remotely and locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideReference {
    /// Sample identifier, also the file stem of the local slide
    pub sample_id: String,
    /// Remote location of the slide bytes
    pub remote_url: String,
    /// Path of the local slide file
    pub local_path: PathBuf,
    /// Expected SHA-256 of the slide bytes (lowercase hex), if known
    pub sha256: Option<String>,
}

impl SlideReference {
    /// Reference for `sample_id` stored as `{dir}/{sample_id}.{extension}`
    #[must_use]
    pub fn new(sample_id: &str, url_root: &str, dir: &Path, extension: &str) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            remote_url: format!("{}/{sample_id}", url_root.trim_end_matches('/')),
            local_path: local_slide_path(dir, sample_id, extension),
            sha256: None,
        }
    }

    /// Attach an expected checksum
    #[must_use]
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    /// Whether the slide is already stored locally
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.local_path.is_file()
    }
}

/// Local path of a slide file
#[must_use]
pub fn local_slide_path(dir: &Path, sample_id: &str, extension: &str) -> PathBuf {
    dir.join(format!("{sample_id}.{}", extension.trim_start_matches('.')))
}

/// Build one reference per unique sample id of the metadata table
///
/// Row order is kept; repeated and null sample ids are skipped.
pub fn slide_references(
    metadata: &RecordBatch,
    sample_column: &str,
    url_root: &str,
    dir: &Path,
    extension: &str,
) -> Result<Vec<SlideReference>> {
    let samples: &StringArray = string_column(metadata, sample_column)?;
    let mut seen = FxHashSet::default();

    let references = (0..samples.len())
        .filter(|&i| !samples.is_null(i))
        .map(|i| samples.value(i))
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(|id| SlideReference::new(id, url_root, dir, extension))
        .collect();

    Ok(references)
}

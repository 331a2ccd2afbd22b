//! Test helper functions

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::common::RemoteStore;
use crate::config::{PipelineConfig, TileSize};
use crate::error::{Result, TilerError};
use crate::models::SlideReference;

use super::fixtures::slide_png_bytes;

/// Remote store serving synthetic PNG slides and counting requests
///
/// Sample ids listed in `missing` answer with a transfer failure.
#[derive(Debug, Default)]
pub struct CountingStore {
    calls: AtomicUsize,
    missing: Vec<String>,
    size: (u32, u32),
}

impl CountingStore {
    /// Store serving `width x height` slides
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Default::default()
        }
    }

    /// Make `sample_id` unavailable
    #[must_use]
    pub fn without(mut self, sample_id: &str) -> Self {
        self.missing.push(sample_id.to_string());
        self
    }

    /// Number of fetches so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteStore for CountingStore {
    fn fetch(&self, reference: &SlideReference, sink: &mut dyn Write) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(&reference.sample_id) {
            return Err(TilerError::TransferFailure {
                sample_id: reference.sample_id.clone(),
                reason: "HTTP 404 Not Found".to_string(),
            });
        }
        let bytes = slide_png_bytes(self.size.0, self.size.1)?;
        sink.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Small, fast pipeline configuration rooted at `root`
///
/// Slides are PNG files, tiles are 16x16 at level 0 and the politeness delay
/// is disabled.
#[must_use]
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        metadata_csv: root.join("metadata.csv"),
        wsi_dir: root.join("wsi"),
        tile_dir: root.join("out"),
        threads: Some(2),
        ..Default::default()
    };
    config.retrieval.extension = "png".to_string();
    config.retrieval.delay_secs = 0..0;
    config.extraction.tile_size = TileSize::new(16, 16);
    config.extraction.n_tiles = 4;
    config.extraction.level = 0;
    config.extraction.check_tissue = false;
    config.extraction.valid_extensions = vec!["png".to_string()];
    config
}

/// Run `func` and report how long it took
pub fn timed_execution<T, F>(func: F) -> (Duration, T)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = func();
    (start.elapsed(), result)
}

//! Slide retrieval
//!
//! Makes sure every referenced slide exists in the slide directory. Slides
//! already on disk are skipped without touching the network; missing ones are
//! fetched one at a time with a random politeness delay after each request.
//! Bodies are streamed into a `.part` file and hashed on the way, so a slide
//! is never held in memory.

pub mod http;

use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::common::RemoteStore;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::error::util::ensure_directory;
use crate::models::SlideReference;
use crate::utils::io::PartFile;
use crate::utils::logging::{create_item_progress_bar, finish_progress_bar, log_stage_summary};

pub use http::{HttpStore, RegistryEntry, RegistryStore};

/// A sample whose slide could not be retrieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    /// Sample identifier
    pub sample_id: String,
    /// Why the transfer failed
    pub reason: String,
}

/// Outcome of one retrieval run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Samples already present locally
    pub present: Vec<String>,
    /// Samples fetched and written
    pub fetched: Vec<String>,
    /// Samples that failed
    pub failures: Vec<TransferFailure>,
}

impl RetrievalReport {
    /// Number of network requests issued
    #[must_use]
    pub fn requests(&self) -> usize {
        self.fetched.len() + self.failures.len()
    }
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Download target hashing every byte written to it
///
/// Write failures of the local file are kept apart so they can abort the run
/// instead of being reported as a transfer failure.
struct HashingSink {
    file: PartFile,
    hasher: Sha256,
    written: u64,
    local_error: Option<io::Error>,
}

impl HashingSink {
    fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            file: PartFile::create(path)?,
            hasher: Sha256::new(),
            written: 0,
            local_error: None,
        })
    }

    fn record(&mut self, error: io::Error) -> io::Error {
        let reported = io::Error::new(error.kind(), error.to_string());
        self.local_error = Some(error);
        reported
    }
}

impl Write for HashingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.write(buf) {
            Ok(n) => {
                self.hasher.update(&buf[..n]);
                self.written += n as u64;
                Ok(n)
            }
            Err(e) => Err(self.record(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush().map_err(|e| self.record(e))
    }
}

/// Sequential downloader with skip-if-present and a politeness delay
pub struct SlideRetriever {
    directory: PathBuf,
    delay_secs: Range<u64>,
    sleep: Sleeper,
}

impl std::fmt::Debug for SlideRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideRetriever")
            .field("directory", &self.directory)
            .field("delay_secs", &self.delay_secs)
            .finish_non_exhaustive()
    }
}

impl SlideRetriever {
    /// Retriever writing into `directory`
    pub fn new(directory: impl Into<PathBuf>, config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            directory: directory.into(),
            delay_secs: config.delay_secs.clone(),
            sleep: Box::new(std::thread::sleep),
        })
    }

    /// Replace the function used to wait between requests
    #[must_use]
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Directory slides are written into
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn politeness_delay(&self) -> Duration {
        if self.delay_secs.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::rng().random_range(self.delay_secs.clone()))
    }

    /// Make every reference present in the slide directory
    ///
    /// Duplicate sample ids are handled once. Transfer failures are collected
    /// in the report; only local IO failures abort the run.
    pub fn retrieve(
        &self,
        store: &dyn RemoteStore,
        references: &[SlideReference],
    ) -> Result<RetrievalReport> {
        let start = Instant::now();
        ensure_directory(&self.directory, "slide storage")?;

        let mut seen = FxHashSet::default();
        let unique: Vec<&SlideReference> = references
            .iter()
            .filter(|r| seen.insert(r.sample_id.as_str()))
            .collect();

        info!(
            "Retrieving {} slides into {}",
            unique.len(),
            self.directory.display()
        );
        let pb = create_item_progress_bar(unique.len() as u64, Some("Retrieving slides"));
        let mut report = RetrievalReport::default();

        for reference in unique {
            pb.set_message(reference.sample_id.clone());

            if reference.is_present() {
                debug!("{} already present, skipping", reference.sample_id);
                report.present.push(reference.sample_id.clone());
                pb.inc(1);
                continue;
            }

            let mut sink = HashingSink::create(&reference.local_path)?;
            let fetched = store.fetch(reference, &mut sink);
            if let Some(e) = sink.local_error.take() {
                sink.file.discard();
                return Err(e.into());
            }

            let outcome = match fetched {
                Ok(_) => {
                    let expected = reference
                        .sha256
                        .clone()
                        .or_else(|| store.expected_sha256(&reference.sample_id));
                    self.store_slide(expected.as_deref(), sink)?
                }
                Err(e) if !e.is_fatal() => {
                    sink.file.discard();
                    Err(e.to_string())
                }
                Err(e) => {
                    sink.file.discard();
                    return Err(e);
                }
            };

            match outcome {
                Ok(()) => report.fetched.push(reference.sample_id.clone()),
                Err(reason) => {
                    warn!("Could not retrieve {}: {reason}", reference.sample_id);
                    report.failures.push(TransferFailure {
                        sample_id: reference.sample_id.clone(),
                        reason,
                    });
                }
            }
            pb.inc(1);

            let delay = self.politeness_delay();
            debug!("Waiting {delay:?} before the next request");
            (self.sleep)(delay);
        }

        finish_progress_bar(&pb, Some("Retrieval complete"));
        log_stage_summary(
            "Retrieval",
            report.present.len() + report.fetched.len(),
            report.failures.len(),
            start.elapsed(),
        );
        Ok(report)
    }

    /// Move a completed download into place; the inner error is a transfer failure reason
    fn store_slide(
        &self,
        expected_sha256: Option<&str>,
        sink: HashingSink,
    ) -> Result<std::result::Result<(), String>> {
        let HashingSink {
            file,
            hasher,
            written,
            ..
        } = sink;

        if let Some(expected) = expected_sha256 {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                file.discard();
                return Ok(Err(format!(
                    "checksum mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        file.commit()?;

        if written == 0 {
            return Ok(Err("remote returned an empty body".to_string()));
        }
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TilerError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStore {
        calls: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RemoteStore for FakeStore {
        fn fetch(&self, reference: &SlideReference, sink: &mut dyn Write) -> Result<u64> {
            self.calls.lock().unwrap().push(reference.sample_id.clone());
            let body = match reference.sample_id.as_str() {
                "missing" => {
                    return Err(TilerError::TransferFailure {
                        sample_id: reference.sample_id.clone(),
                        reason: "HTTP 404".to_string(),
                    });
                }
                "cut" => {
                    sink.write_all(b"partial")?;
                    return Err(TilerError::TransferFailure {
                        sample_id: reference.sample_id.clone(),
                        reason: "connection reset".to_string(),
                    });
                }
                "empty" => Vec::new(),
                id => format!("slide {id}").into_bytes(),
            };
            // Arrives in small chunks like a network body
            for chunk in body.chunks(3) {
                sink.write_all(chunk)?;
            }
            Ok(body.len() as u64)
        }
    }

    fn retriever(dir: &Path, sleeps: &'static AtomicUsize) -> SlideRetriever {
        let config = RetrievalConfig {
            delay_secs: 0..0,
            ..Default::default()
        };
        SlideRetriever::new(dir, &config).unwrap().with_sleeper(move |_| {
            sleeps.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn reference(dir: &Path, id: &str) -> SlideReference {
        SlideReference::new(id, "https://example.org", dir, "svs")
    }

    #[test]
    fn present_slides_are_not_fetched() {
        static SLEEPS: AtomicUsize = AtomicUsize::new(0);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.svs"), b"existing").unwrap();

        let store = FakeStore::new();
        let refs = [reference(dir.path(), "A"), reference(dir.path(), "B")];
        let report = retriever(dir.path(), &SLEEPS).retrieve(&store, &refs).unwrap();

        assert_eq!(store.calls(), vec!["B".to_string()]);
        assert_eq!(report.present, vec!["A".to_string()]);
        assert_eq!(report.fetched, vec!["B".to_string()]);
        assert_eq!(SLEEPS.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(dir.path().join("A.svs")).unwrap(), b"existing");
        assert_eq!(std::fs::read(dir.path().join("B.svs")).unwrap(), b"slide B");
        assert!(!dir.path().join("B.svs.part").exists());
    }

    #[test]
    fn failures_are_isolated_and_not_written() {
        static SLEEPS: AtomicUsize = AtomicUsize::new(0);
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        let refs = [
            reference(dir.path(), "missing"),
            reference(dir.path(), "empty"),
            reference(dir.path(), "C"),
        ];
        let report = retriever(dir.path(), &SLEEPS).retrieve(&store, &refs).unwrap();

        assert_eq!(report.fetched, vec!["C".to_string()]);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.requests(), 3);
        assert_eq!(SLEEPS.load(Ordering::SeqCst), 3);
        assert!(!dir.path().join("missing.svs").exists());
        assert_eq!(std::fs::metadata(dir.path().join("empty.svs")).unwrap().len(), 0);
    }

    #[test]
    fn duplicates_are_fetched_once() {
        static SLEEPS: AtomicUsize = AtomicUsize::new(0);
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        let refs = [reference(dir.path(), "D"), reference(dir.path(), "D")];
        retriever(dir.path(), &SLEEPS).retrieve(&store, &refs).unwrap();
        assert_eq!(store.calls(), vec!["D".to_string()]);
    }

    #[test]
    fn checksum_mismatch_is_not_persisted() {
        static SLEEPS: AtomicUsize = AtomicUsize::new(0);
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        let good = format!("{:x}", Sha256::digest(b"slide E"));
        let refs = [
            reference(dir.path(), "E").with_sha256(good),
            reference(dir.path(), "F").with_sha256("00"),
        ];
        let report = retriever(dir.path(), &SLEEPS).retrieve(&store, &refs).unwrap();

        assert_eq!(report.fetched, vec!["E".to_string()]);
        assert_eq!(report.failures[0].sample_id, "F");
        assert!(report.failures[0].reason.contains("checksum"));
        assert!(!dir.path().join("F.svs").exists());
        assert!(!dir.path().join("F.svs.part").exists());
    }

    #[test]
    fn interrupted_body_leaves_no_file() {
        static SLEEPS: AtomicUsize = AtomicUsize::new(0);
        let dir = tempfile::tempdir().unwrap();
        let store = FakeStore::new();
        let refs = [reference(dir.path(), "cut"), reference(dir.path(), "G")];
        let report = retriever(dir.path(), &SLEEPS).retrieve(&store, &refs).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.contains("connection reset"));
        assert_eq!(report.fetched, vec!["G".to_string()]);
        assert!(!dir.path().join("cut.svs").exists());
        assert!(!dir.path().join("cut.svs.part").exists());
    }

    #[test]
    fn sink_hashes_everything_written() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("H.svs");
        let mut sink = HashingSink::create(&target).unwrap();
        for chunk in [b"sli".as_slice(), b"de ".as_slice(), b"H".as_slice()] {
            sink.write_all(chunk).unwrap();
        }
        assert_eq!(sink.written, 7);
        assert_eq!(
            format!("{:x}", sink.hasher.clone().finalize()),
            format!("{:x}", Sha256::digest(b"slide H"))
        );
        assert!(sink.local_error.is_none());
        sink.file.commit().unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"slide H");
    }

    #[test]
    fn delay_is_drawn_from_range() {
        let config = RetrievalConfig {
            delay_secs: 60..100,
            ..Default::default()
        };
        let retriever = SlideRetriever::new("unused", &config).unwrap();
        for _ in 0..50 {
            let delay = retriever.politeness_delay().as_secs();
            assert!((60..100).contains(&delay));
        }
    }
}

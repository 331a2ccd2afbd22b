//! Remote slide storage trait

use std::io::Write;

use crate::error::Result;
use crate::models::SlideReference;

/// A remote store that streams the raw bytes of a slide
///
/// Implementations perform exactly one transfer per call; retrying is left
/// to the caller.
pub trait RemoteStore {
    /// Stream the bytes for `reference` into `sink`, returning the byte count
    ///
    /// # Errors
    /// Returns `TilerError::TransferFailure` when the transfer fails or the
    /// remote answers with a non-success status.
    fn fetch(&self, reference: &SlideReference, sink: &mut dyn Write) -> Result<u64>;

    /// Checksum the store expects for `sample_id`, if it knows one
    fn expected_sha256(&self, _sample_id: &str) -> Option<String> {
        None
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use wsi_tiles::config::RetrievalConfig;
use wsi_tiles::models::SlideReference;
use wsi_tiles::retrieval::SlideRetriever;
use wsi_tiles::utils::test::CountingStore;

fn references(dir: &std::path::Path, ids: &[&str]) -> Vec<SlideReference> {
    ids.iter()
        .map(|id| SlideReference::new(id, "https://example.org/brd/imagedownload", dir, "svs"))
        .collect()
}

/// Present slides issue no fetch and no delay
#[test]
fn skip_existing_download() -> wsi_tiles::Result<()> {
    let dir = tempfile::tempdir()?;
    for id in ["GTEX-1", "GTEX-2"] {
        std::fs::write(dir.path().join(format!("{id}.svs")), b"slide")?;
    }

    let sleeps = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sleeps);
    let config = RetrievalConfig {
        delay_secs: 0..0,
        ..Default::default()
    };
    let retriever = SlideRetriever::new(dir.path(), &config)?.with_sleeper(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let store = CountingStore::new(8, 8);
    let report = retriever.retrieve(&store, &references(dir.path(), &["GTEX-1", "GTEX-2"]))?;

    assert_eq!(store.calls(), 0);
    assert_eq!(sleeps.load(Ordering::SeqCst), 0);
    assert_eq!(report.present.len(), 2);
    assert_eq!(report.requests(), 0);
    Ok(())
}

/// Every network request is followed by exactly one delay, failed or not
#[test]
fn delay_follows_every_request() -> wsi_tiles::Result<()> {
    let dir = tempfile::tempdir()?;
    let delays = Arc::new(std::sync::Mutex::new(Vec::new()));
    let recorded = Arc::clone(&delays);
    let config = RetrievalConfig {
        delay_secs: 2..5,
        ..Default::default()
    };
    let retriever = SlideRetriever::new(dir.path(), &config)?.with_sleeper(move |d| {
        recorded.lock().expect("lock").push(d.as_secs());
    });

    let store = CountingStore::new(8, 8).without("GTEX-2");
    let report = retriever.retrieve(&store, &references(dir.path(), &["GTEX-1", "GTEX-2", "GTEX-3"]))?;

    assert_eq!(report.fetched, vec!["GTEX-1".to_string(), "GTEX-3".to_string()]);
    assert_eq!(report.failures.len(), 1);
    let delays = delays.lock().expect("lock").clone();
    assert_eq!(delays.len(), 3);
    assert!(delays.iter().all(|d| (2..5).contains(d)));
    assert!(dir.path().join("GTEX-3.svs").is_file());
    assert!(!dir.path().join("GTEX-2.svs").exists());
    Ok(())
}

#[test]
fn inverted_delay_range_is_rejected() {
    let config = RetrievalConfig {
        delay_secs: 10..5,
        ..Default::default()
    };
    assert!(SlideRetriever::new("unused", &config).is_err());
}

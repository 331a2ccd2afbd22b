use std::collections::BTreeSet;

use crate::utils::{GTEX_ROWS, csv_column, setup};
use wsi_tiles::algorithm::join::TILE_FILENAME_COLUMN;
use wsi_tiles::extraction::MANIFEST_FILE;
use wsi_tiles::pipeline::{PipelineReport, REPORT_FILE, resplit_existing_tiles, run_with_store};
use wsi_tiles::utils::test::{CountingStore, timed_execution, write_slide_png};
use wsi_tiles::{SplitStrategy, TilerError};

/// Four samples from two patients split at 0.5 put exactly one patient in test
#[test]
fn end_to_end_gtex_example() -> wsi_tiles::Result<()> {
    let root = tempfile::tempdir()?;
    let mut config = setup(root.path(), &GTEX_ROWS);
    config.split.test_size = 0.5;
    config.split.seed = 1234;
    let store = CountingStore::new(64, 64);

    let (elapsed, report) = timed_execution(|| run_with_store(&config, &store));
    let report = report?;
    println!("Pipeline ran in {elapsed:?}");

    let retrieval = report.retrieval.as_ref().expect("retrieval ran");
    assert_eq!(retrieval.fetched.len(), 4);
    assert!(retrieval.failures.is_empty());
    assert_eq!(store.calls(), 4);

    let extraction = report.extraction.as_ref().expect("extraction ran");
    assert_eq!(extraction.slides, 4);
    assert_eq!(extraction.tiles, 16);
    assert!(config.tiles_dir().join(MANIFEST_FILE).is_file());

    assert_eq!(report.join.joined_tiles, 16);
    assert!(report.join.mismatches.is_empty());

    let assignment = &report.split.assignment;
    assert_eq!(assignment.test.len(), 1);
    assert_eq!(assignment.train.len(), 1);
    assert!(assignment.is_disjoint());
    assert_eq!(report.split.train_tiles, 8);
    assert_eq!(report.split.test_tiles, 8);

    let (train_path, test_path) = config.split_paths();
    let train_patients: BTreeSet<String> = csv_column(&train_path, "Subject ID").into_iter().collect();
    let test_patients: BTreeSet<String> = csv_column(&test_path, "Subject ID").into_iter().collect();
    assert_eq!(&train_patients, &assignment.train);
    assert_eq!(&test_patients, &assignment.test);
    assert!(train_patients.is_disjoint(&test_patients));

    let mut all_tiles = csv_column(&train_path, TILE_FILENAME_COLUMN);
    all_tiles.extend(csv_column(&test_path, TILE_FILENAME_COLUMN));
    assert_eq!(all_tiles.len(), 16);
    assert!(all_tiles.iter().all(|t| config.tiles_dir().join(t).is_file()));

    Ok(())
}

#[test]
fn rerun_skips_downloads_and_repeats_the_split() -> wsi_tiles::Result<()> {
    let root = tempfile::tempdir()?;
    let mut config = setup(root.path(), &GTEX_ROWS);
    config.split.test_size = 0.5;
    let store = CountingStore::new(64, 64);

    let first = run_with_store(&config, &store)?;
    let first_test_tiles = csv_column(&first.split.test_path, TILE_FILENAME_COLUMN);
    let second = run_with_store(&config, &store)?;

    assert_eq!(store.calls(), 4);
    let retrieval = second.retrieval.as_ref().expect("retrieval ran");
    assert_eq!(retrieval.present.len(), 4);
    assert_eq!(retrieval.requests(), 0);
    assert_eq!(first.split.assignment, second.split.assignment);
    assert_eq!(
        csv_column(&second.split.test_path, TILE_FILENAME_COLUMN),
        first_test_tiles
    );
    Ok(())
}

#[test]
fn failures_are_isolated_and_reported() -> wsi_tiles::Result<()> {
    let root = tempfile::tempdir()?;
    let config = setup(root.path(), &GTEX_ROWS);
    let store = CountingStore::new(64, 64).without("GTEX-111CU-0226");

    // A slide on disk without a metadata row, and one that cannot be decoded
    std::fs::create_dir_all(&config.wsi_dir)?;
    write_slide_png(&config.wsi_dir, "GTEX-ZZZZ-0001", 64, 64)?;
    std::fs::write(config.wsi_dir.join("GTEX-1117F-0226.png"), b"<html>error</html>")?;

    let report = run_with_store(&config, &store)?;

    let retrieval = report.retrieval.as_ref().expect("retrieval ran");
    assert_eq!(retrieval.failures.len(), 1);
    assert_eq!(retrieval.failures[0].sample_id, "GTEX-111CU-0226");
    assert_eq!(retrieval.present, vec!["GTEX-1117F-0226".to_string()]);

    let extraction = report.extraction.as_ref().expect("extraction ran");
    assert_eq!(extraction.slides, 4);
    assert_eq!(extraction.failures.len(), 1);
    assert_eq!(extraction.failures[0].slide_id, "GTEX-1117F-0226");

    assert_eq!(report.join.mismatches.len(), 4);
    assert!(report
        .join
        .mismatches
        .iter()
        .all(|m| m.sample_id.as_deref() == Some("GTEX-ZZZZ-0001")));
    assert_eq!(
        report.join.samples_without_tiles,
        vec!["GTEX-1117F-0226".to_string(), "GTEX-111CU-0226".to_string()]
    );
    assert_eq!(report.split.train_tiles + report.split.test_tiles, 8);
    Ok(())
}

#[test]
fn report_is_written_as_json() -> wsi_tiles::Result<()> {
    let root = tempfile::tempdir()?;
    let config = setup(root.path(), &GTEX_ROWS);
    let report = run_with_store(&config, &CountingStore::new(48, 48))?;

    let json = std::fs::read_to_string(config.tile_dir.join(REPORT_FILE))?;
    let parsed: PipelineReport = serde_json::from_str(&json)?;
    assert_eq!(parsed.split.assignment, report.split.assignment);
    assert_eq!(parsed.metadata_rows, 4);
    assert!(json.contains("\"kind\""));
    Ok(())
}

#[test]
fn resplit_from_manifest_or_scan_matches_the_run() -> wsi_tiles::Result<()> {
    let root = tempfile::tempdir()?;
    let config = setup(root.path(), &GTEX_ROWS);
    let report = run_with_store(&config, &CountingStore::new(64, 64))?;

    let from_manifest = resplit_existing_tiles(&config)?;
    assert_eq!(from_manifest.split.assignment, report.split.assignment);
    assert_eq!(from_manifest.join.joined_tiles, 16);
    assert!(from_manifest.extraction.is_none());

    std::fs::remove_file(config.tiles_dir().join(MANIFEST_FILE))?;
    let from_scan = resplit_existing_tiles(&config)?;
    assert_eq!(from_scan.split.assignment, report.split.assignment);
    assert_eq!(from_scan.join.joined_tiles, 16);
    Ok(())
}

#[test]
fn single_labels_fall_back_to_random_split() -> wsi_tiles::Result<()> {
    let root = tempfile::tempdir()?;
    let rows = [
        ("S1-0001", "P1", "Lung"),
        ("S2-0001", "P2", "Liver"),
        ("S3-0001", "P3", "Heart"),
    ];
    let config = setup(root.path(), &rows);
    let report = run_with_store(&config, &CountingStore::new(32, 32))?;

    assert!(matches!(
        report.split.assignment.strategy,
        SplitStrategy::Random { .. }
    ));
    assert_eq!(report.split.assignment.test.len(), 1);
    assert_eq!(report.split.assignment.train.len(), 2);
    Ok(())
}

#[test]
fn missing_metadata_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let config = wsi_tiles::utils::test::test_config(root.path());
    let err = run_with_store(&config, &CountingStore::new(32, 32)).unwrap_err();
    assert!(matches!(err, TilerError::ConfigError(_)), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn missing_label_column_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let mut config = setup(root.path(), &GTEX_ROWS);
    config.columns.label = "Histology".to_string();
    let store = CountingStore::new(32, 32);
    assert!(run_with_store(&config, &store).is_err());
    assert_eq!(store.calls(), 0);
}

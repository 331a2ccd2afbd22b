use std::collections::BTreeSet;

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wsi_tiles::algorithm::split::{PatientWiseSplitter, test_count};
use wsi_tiles::config::SplitConfig;
use wsi_tiles::utils::arrow_utils::{non_empty_value, string_batch, string_column};
use wsi_tiles::RecordBatch;

const LABELS: [&str; 3] = ["Lung", "Liver", "Heart"];

/// Random joined table: `patients` patients with 1-4 tiles each
fn joined_table(patients: usize, seed: u64) -> RecordBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows: Vec<(String, String, String)> = Vec::new();
    for p in 0..patients {
        let label = LABELS[rng.random_range(0..LABELS.len())];
        for t in 0..rng.random_range(1..=4) {
            rows.push((format!("P{p:03}"), label.to_string(), format!("P{p:03}-S_tile_{t}.png")));
        }
    }
    string_batch(&[
        ("Subject ID", rows.iter().map(|r| Some(r.0.as_str())).collect()),
        ("Tissue", rows.iter().map(|r| Some(r.1.as_str())).collect()),
        ("tile_filename", rows.iter().map(|r| Some(r.2.as_str())).collect()),
    ])
    .unwrap()
}

fn column(batch: &RecordBatch, name: &str) -> Vec<String> {
    let array = string_column(batch, name).unwrap();
    (0..batch.num_rows())
        .filter_map(|i| non_empty_value(array, i))
        .map(str::to_string)
        .collect()
}

fn splitter(test_size: f64, seed: u64) -> PatientWiseSplitter {
    PatientWiseSplitter::new("Subject ID", "Tissue", &SplitConfig { test_size, seed }).unwrap()
}

/// No patient appears on both sides and every row lands exactly once
#[test]
fn disjointness_and_coverage() {
    for (patients, seed) in (2..30).cartesian_product([1, 7, 1234]) {
        let table = joined_table(patients, seed);
        let split = splitter(0.3, seed).split(&table).unwrap();

        let train: BTreeSet<String> = column(&split.train, "Subject ID").into_iter().collect();
        let test: BTreeSet<String> = column(&split.test, "Subject ID").into_iter().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), patients);

        let mut tiles = column(&split.train, "tile_filename");
        tiles.extend(column(&split.test, "tile_filename"));
        tiles.sort();
        let mut expected = column(&table, "tile_filename");
        expected.sort();
        assert_eq!(tiles, expected);
    }
}

/// Same input and seed give the same assignment
#[test]
fn determinism() {
    let table = joined_table(40, 3);
    let a = splitter(0.2, 99).split(&table).unwrap();
    let b = splitter(0.2, 99).split(&table).unwrap();
    assert_eq!(a.assignment, b.assignment);
    assert_eq!(column(&a.test, "tile_filename"), column(&b.test, "tile_filename"));
}

/// Test patient count is within one of `r * n` and both sides are populated
#[test]
fn split_ratio_bound() {
    for n in 2..60 {
        for r in [0.05, 0.2, 0.5, 0.8, 0.95] {
            let assignment = splitter(r, 1).assign(&joined_table(n, n as u64)).unwrap();
            let n_test = assignment.test.len();
            assert_eq!(n_test, test_count(n, r));
            assert!((n_test as f64 - r * n as f64).abs() <= 1.0, "n={n} r={r}");
            assert!(n_test >= 1 && n_test < n);
        }
    }
}

#[test]
fn different_seeds_give_different_assignments() {
    let table = joined_table(50, 11);
    let assignments = (0..5)
        .map(|seed| splitter(0.2, seed).assign(&table).unwrap().test)
        .collect_vec();
    assert!(assignments.iter().unique().count() > 1);
}

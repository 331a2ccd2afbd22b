//! Console output utilities
//!
//! This module provides utilities for formatted console output.

use crate::models::SplitStrategy;
use crate::pipeline::PipelineReport;

/// Print a short summary of a pipeline run
pub fn print_run_summary(report: &PipelineReport) {
    println!("Pipeline finished in {:.1}s", report.elapsed_secs);
    println!("Metadata rows: {}", report.metadata_rows);

    if let Some(retrieval) = &report.retrieval {
        println!(
            "Slides: {} present, {} fetched, {} failed",
            retrieval.present.len(),
            retrieval.fetched.len(),
            retrieval.failures.len()
        );
    }

    if let Some(extraction) = &report.extraction {
        println!(
            "Tiles: {} from {} slides ({} unreadable)",
            extraction.tiles,
            extraction.slides,
            extraction.failures.len()
        );
    }

    println!(
        "Joined tiles: {} ({} without metadata)",
        report.join.joined_tiles,
        report.join.mismatches.len()
    );

    let assignment = &report.split.assignment;
    let strategy = match &assignment.strategy {
        SplitStrategy::Stratified { strata } => format!("stratified over {strata} labels"),
        SplitStrategy::Random { reason } => format!("random ({reason})"),
    };
    println!(
        "Train: {} patients, {} tiles -> {}",
        assignment.train.len(),
        report.split.train_tiles,
        report.split.train_path.display()
    );
    println!(
        "Test: {} patients, {} tiles -> {}",
        assignment.test.len(),
        report.split.test_tiles,
        report.split.test_path.display()
    );
    println!(
        "Split: {strategy}, {:.0}% of patients in test",
        assignment.test_fraction() * 100.0
    );
}

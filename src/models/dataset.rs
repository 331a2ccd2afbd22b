//! Train/test partition of the joined tile table

use std::collections::BTreeSet;

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

/// Which branch of the split policy produced an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Patients were split per label stratum
    Stratified {
        /// Number of label strata
        strata: usize,
    },
    /// Stratification was not possible; patients were split uniformly
    Random {
        /// Why stratification was abandoned
        reason: String,
    },
}

/// Patient-level train/test assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientAssignment {
    /// Patients whose tiles go to the training table
    pub train: BTreeSet<String>,
    /// Patients whose tiles go to the test table
    pub test: BTreeSet<String>,
    /// Branch of the split policy that was used
    pub strategy: SplitStrategy,
}

impl PatientAssignment {
    /// Total number of patients
    #[must_use]
    pub fn patient_count(&self) -> usize {
        self.train.len() + self.test.len()
    }

    /// Fraction of patients assigned to test
    #[must_use]
    pub fn test_fraction(&self) -> f64 {
        match self.patient_count() {
            0 => 0.0,
            n => self.test.len() as f64 / n as f64,
        }
    }

    /// Whether the train and test patient sets are disjoint
    #[must_use]
    pub fn is_disjoint(&self) -> bool {
        self.train.is_disjoint(&self.test)
    }
}

/// Joined tile table split patient-wise into train and test
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    /// Training tiles
    pub train: RecordBatch,
    /// Test tiles
    pub test: RecordBatch,
    /// Patient assignment the tables were built from
    pub assignment: PatientAssignment,
}

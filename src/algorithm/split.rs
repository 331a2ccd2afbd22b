//! Patient-wise train/test split
//!
//! Patients, not tiles, are the unit of assignment: every tile of a patient
//! lands in the same table. The split first tries to stratify patients by
//! their first-listed label and falls back to a plain random split over
//! patients when the strata are too small.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use arrow::array::BooleanArray;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use smallvec::SmallVec;

use crate::config::SplitConfig;
use crate::error::{Result, TilerError};
use crate::models::{DatasetSplit, PatientAssignment, SplitStrategy};
use crate::utils::arrow_utils::{filter_record_batch, non_empty_value, string_column};
use crate::utils::io::write_csv;

/// Why a stratified split is not possible for the requested test size
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InsufficientStratificationGroups {
    /// A label stratum cannot be represented on both sides
    #[error("label '{label}' has only {patients} patient(s)")]
    SingletonStratum {
        /// Label of the stratum
        label: String,
        /// Patients carrying the label
        patients: usize,
    },
    /// Fewer test patients than strata
    #[error("{n_test} test patient(s) cannot cover {strata} label strata")]
    TestTooSmall {
        /// Requested number of test patients
        n_test: usize,
        /// Number of strata
        strata: usize,
    },
    /// Fewer train patients than strata
    #[error("{n_train} train patient(s) cannot cover {strata} label strata")]
    TrainTooSmall {
        /// Remaining number of train patients
        n_train: usize,
        /// Number of strata
        strata: usize,
    },
}

/// Labels seen for one patient, in row order
type PatientLabels = SmallVec<[String; 2]>;

/// Splits a joined tile table into train and test tables by patient
#[derive(Debug, Clone)]
pub struct PatientWiseSplitter {
    patient_column: String,
    label_column: String,
    test_size: f64,
    seed: u64,
}

impl PatientWiseSplitter {
    /// Create a splitter over the given columns
    pub fn new(
        patient_column: impl Into<String>,
        label_column: impl Into<String>,
        config: &SplitConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            patient_column: patient_column.into(),
            label_column: label_column.into(),
            test_size: config.test_size,
            seed: config.seed,
        })
    }

    /// Group the labels of `table` by patient
    ///
    /// # Errors
    /// A row without a patient id cannot be assigned and is a validation error.
    fn patient_labels(&self, table: &RecordBatch) -> Result<BTreeMap<String, PatientLabels>> {
        let patients = string_column(table, &self.patient_column)?;
        let labels = string_column(table, &self.label_column)?;

        let mut grouped: BTreeMap<String, PatientLabels> = BTreeMap::new();
        for row in 0..table.num_rows() {
            let patient = non_empty_value(patients, row).ok_or_else(|| {
                TilerError::ValidationError(format!(
                    "Row {row} has no value in patient column '{}'",
                    self.patient_column
                ))
            })?;
            let label = non_empty_value(labels, row).unwrap_or_default();

            let entry = grouped.entry(patient.to_string()).or_default();
            if !entry.iter().any(|l| l == label) {
                entry.push(label.to_string());
            }
        }
        Ok(grouped)
    }

    /// Assign the unique patients of `table` to train or test
    pub fn assign(&self, table: &RecordBatch) -> Result<PatientAssignment> {
        let grouped = self.patient_labels(table)?;
        let n = grouped.len();
        let n_test = test_count(n, self.test_size);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut strata: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (patient, labels) in &grouped {
            let key = labels.first().map_or("", String::as_str);
            strata.entry(key).or_default().push(patient.as_str());
        }

        let (test, strategy) = match stratified_test_patients(&strata, n, n_test, &mut rng) {
            Ok(test) => (test, SplitStrategy::Stratified {
                strata: strata.len(),
            }),
            Err(reason) => {
                warn!("Stratified split not possible ({reason}); splitting patients at random");
                let mut rng = StdRng::seed_from_u64(self.seed);
                (
                    random_test_patients(grouped.keys().map(String::as_str), n_test, &mut rng),
                    SplitStrategy::Random {
                        reason: reason.to_string(),
                    },
                )
            }
        };

        let test: BTreeSet<String> = test.into_iter().map(str::to_string).collect();
        let train: BTreeSet<String> = grouped
            .into_keys()
            .filter(|patient| !test.contains(patient))
            .collect();

        info!(
            "Assigned {} patients to train and {} to test ({:?})",
            train.len(),
            test.len(),
            strategy
        );

        Ok(PatientAssignment {
            train,
            test,
            strategy,
        })
    }

    /// Split `table` into train and test tables by patient
    pub fn split(&self, table: &RecordBatch) -> Result<DatasetSplit> {
        let assignment = self.assign(table)?;
        let patients = string_column(table, &self.patient_column)?;

        let in_test: BooleanArray = (0..table.num_rows())
            .map(|row| {
                non_empty_value(patients, row).map(|p| assignment.test.contains(p))
            })
            .collect();
        let in_train = arrow::compute::not(&in_test)?;

        let train = filter_record_batch(table, &in_train)?;
        let test = filter_record_batch(table, &in_test)?;

        info!(
            "Split {} tiles into {} train and {} test tiles",
            table.num_rows(),
            train.num_rows(),
            test.num_rows()
        );

        Ok(DatasetSplit {
            train,
            test,
            assignment,
        })
    }
}

/// Number of test patients for `n` patients and test fraction `test_size`
///
/// Rounds up, then keeps at least one patient on each side when `n >= 2`.
/// A single patient always goes to train.
#[must_use]
pub fn test_count(n: usize, test_size: f64) -> usize {
    if n < 2 {
        return 0;
    }
    let raw = (test_size * n as f64 - 1e-9).ceil().max(0.0) as usize;
    raw.clamp(1, n - 1)
}

/// Test patients of a stratified split, or why stratification is impossible
fn stratified_test_patients<'a>(
    strata: &BTreeMap<&str, Vec<&'a str>>,
    n: usize,
    n_test: usize,
    rng: &mut StdRng,
) -> std::result::Result<Vec<&'a str>, InsufficientStratificationGroups> {
    if let Some((label, members)) = strata.iter().find(|(_, members)| members.len() < 2) {
        return Err(InsufficientStratificationGroups::SingletonStratum {
            label: (*label).to_string(),
            patients: members.len(),
        });
    }
    if n_test < strata.len() {
        return Err(InsufficientStratificationGroups::TestTooSmall {
            n_test,
            strata: strata.len(),
        });
    }
    if n - n_test < strata.len() {
        return Err(InsufficientStratificationGroups::TrainTooSmall {
            n_train: n - n_test,
            strata: strata.len(),
        });
    }

    let counts = strata.values().map(Vec::len).collect_vec();
    let quotas = stratum_quotas(&counts, n, n_test);

    let mut test = Vec::with_capacity(n_test);
    for (members, quota) in strata.values().zip(quotas) {
        let mut members = members.clone();
        members.shuffle(rng);
        test.extend(members.into_iter().take(quota));
    }
    Ok(test)
}

/// Per-stratum test quotas summing to `n_test` (largest remainder)
///
/// Leftover seats go first to strata that keep at least one train patient.
fn stratum_quotas(counts: &[usize], n: usize, n_test: usize) -> Vec<usize> {
    let mut quotas = counts.iter().map(|&c| c * n_test / n).collect_vec();
    let order = (0..counts.len())
        .sorted_by_key(|&i| std::cmp::Reverse(counts[i] * n_test % n))
        .collect_vec();

    let mut leftover = n_test - quotas.iter().sum::<usize>();
    for keep_train in [true, false] {
        while leftover > 0 {
            let before = leftover;
            for &i in &order {
                let cap = if keep_train { counts[i] - 1 } else { counts[i] };
                if leftover > 0 && quotas[i] < cap {
                    quotas[i] += 1;
                    leftover -= 1;
                }
            }
            if leftover == before || keep_train {
                break;
            }
        }
    }
    quotas
}

/// First `n_test` patients of a seeded shuffle
fn random_test_patients<'a>(
    patients: impl Iterator<Item = &'a str>,
    n_test: usize,
    rng: &mut StdRng,
) -> Vec<&'a str> {
    let mut patients = patients.collect_vec();
    patients.shuffle(rng);
    patients.truncate(n_test);
    patients
}

/// Write the train and test tables of `split`
pub fn write_split(split: &DatasetSplit, train_path: &Path, test_path: &Path) -> Result<()> {
    write_csv(train_path, &split.train)?;
    write_csv(test_path, &split.test)?;
    Ok(())
}

//! Train/test partitions of a dataset's rows.

use std::collections::BTreeMap;

use bitvec::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TEST_SET;
use crate::error::{Result, ValidationError};

/// The test side of a split as a caller gives it: one list of row indices, or
/// several lists keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestIndices {
    Flat(Vec<usize>),
    Named(BTreeMap<String, Vec<usize>>),
}

impl From<Vec<usize>> for TestIndices {
    fn from(indices: Vec<usize>) -> Self {
        Self::Flat(indices)
    }
}

impl From<BTreeMap<String, Vec<usize>>> for TestIndices {
    fn from(sets: BTreeMap<String, Vec<usize>>) -> Self {
        Self::Named(sets)
    }
}

impl<const N: usize> From<[(&str, Vec<usize>); N]> for TestIndices {
    fn from(sets: [(&str, Vec<usize>); N]) -> Self {
        Self::Named(sets.into_iter().map(|(name, indices)| (name.to_string(), indices)).collect())
    }
}

/// How to split, before it is checked against a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitSpec {
    Indices { train: Vec<usize>, test: TestIndices },
    Fractions { train_fraction: f64, seed: u64 },
}

impl SplitSpec {
    pub fn indices(train: Vec<usize>, test: impl Into<TestIndices>) -> Self {
        Self::Indices {
            train,
            test: test.into(),
        }
    }

    pub fn fractions(train_fraction: f64, seed: u64) -> Self {
        Self::Fractions { train_fraction, seed }
    }

    /// Resolves the split against a dataset of `rows` rows.
    pub fn resolve(&self, rows: usize) -> Result<Split> {
        match self {
            Self::Indices { train, test } => Split::from_indices(train.clone(), test.clone(), rows),
            Self::Fractions { train_fraction, seed } => Split::from_fractions(*train_fraction, rows, *seed),
        }
    }
}

/// One named collection of held-out rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSet {
    name: String,
    indices: Vec<usize>,
}

impl TestSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A checked partition: train rows and one or more test sets, each free of
/// duplicates, in range, and disjoint from train. Test sets may share rows
/// with each other.
///
/// Index order is kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    train: Vec<usize>,
    test: Vec<TestSet>,
    named: bool,
}

impl Split {
    /// Builds a split from explicit row indices.
    ///
    /// A flat test side becomes a single test set named `test`. Each sequence
    /// is checked for range and duplicates as it is read, train first, then
    /// each test set by name; overlap between train and test is checked last.
    pub fn from_indices(train: Vec<usize>, test: TestIndices, rows: usize) -> Result<Self> {
        let (test, named) = match test {
            TestIndices::Flat(indices) => (
                vec![TestSet {
                    name: DEFAULT_TEST_SET.to_string(),
                    indices,
                }],
                false,
            ),
            TestIndices::Named(sets) if sets.is_empty() => return Err(ValidationError::Empty("test sets").into()),
            TestIndices::Named(sets) => (sets.into_iter().map(|(name, indices)| TestSet { name, indices }).collect(), true),
        };

        let in_train = members("train", &train, rows)?;
        for set in &test {
            if set.is_empty() {
                return Err(ValidationError::EmptyTestSet(set.name.clone()).into());
            }
            members(&set.name, &set.indices, rows)?;
        }

        for set in &test {
            let shared = set.indices.iter().copied().filter(|&i| in_train[i]).collect::<Vec<_>>();
            if !shared.is_empty() {
                return Err(ValidationError::Overlap {
                    set: set.name.clone(),
                    indices: shared,
                }
                .into());
            }
        }

        let split = Self { train, test, named };
        log::debug!(
            "resolved split over {rows} rows: {} train, test sets {:?}",
            split.n_train(),
            split.test.iter().map(|s| (s.name.as_str(), s.len())).collect::<Vec<_>>()
        );
        Ok(split)
    }

    /// Shuffles `0..rows` with a ChaCha8 generator seeded by `seed` and cuts
    /// the permutation after `floor(train_fraction * rows)` rows. Train is the
    /// head and the single test set is the tail, both in permutation order.
    ///
    /// The same arguments give the same split on every platform.
    pub fn from_fractions(train_fraction: f64, rows: usize, seed: u64) -> Result<Self> {
        if !(train_fraction > 0. && train_fraction < 1.) {
            return Err(ValidationError::InvalidFraction(train_fraction).into());
        }

        let mut permutation = (0..rows).collect::<Vec<_>>();
        permutation.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

        let n_train = (train_fraction * rows as f64).floor() as usize;
        let test = permutation.split_off(n_train);
        Self::from_indices(permutation, TestIndices::Flat(test), rows)
    }

    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn test_sets(&self) -> &[TestSet] {
        &self.test
    }

    /// Selects a test set by name. The name may be left out only when there
    /// is exactly one test set.
    pub fn test_set(&self, name: Option<&str>) -> Result<&TestSet> {
        match name {
            Some(name) => self
                .test
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| ValidationError::UnknownTestSet(name.to_string()).into()),
            None => match self.test.as_slice() {
                [only] => Ok(only),
                _ => Err(ValidationError::AmbiguousTestSet(self.test_set_names().into_iter().map(String::from).collect()).into()),
            },
        }
    }

    pub fn test_set_names(&self) -> Vec<&str> {
        self.test.iter().map(|s| s.name.as_str()).collect()
    }

    /// Whether the test side was given as named sets.
    pub fn is_named(&self) -> bool {
        self.named
    }

    pub fn n_train(&self) -> usize {
        self.train.len()
    }

    /// Total size of all test sets, counting a row once per set it is in.
    pub fn n_test(&self) -> usize {
        self.test.iter().map(TestSet::len).sum()
    }
}

/// Membership bitmap of `indices`, failing on the first index out of range or
/// seen twice.
fn members(set: &str, indices: &[usize], rows: usize) -> Result<BitVec> {
    let mut seen = bitvec![0; rows];
    for &index in indices {
        if index >= rows {
            return Err(ValidationError::IndexOutOfRange {
                context: set.to_string(),
                index,
                length: rows,
            }
            .into());
        }
        if seen.replace(index, true) {
            return Err(ValidationError::DuplicateIndex {
                set: set.to_string(),
                index,
            }
            .into());
        }
    }
    Ok(seen)
}

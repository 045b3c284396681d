use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::metric::{Arity, Metric, MetricRegistry};
use super::split::{Split, SplitSpec, TestSet};
use crate::data::{Dataset, Datum, Modality};
use crate::error::{Result, ValidationError};
use crate::utils::helpers;

/// One or more column names. A single name is promoted to a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnNames(Vec<String>);

impl ColumnNames {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for ColumnNames {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for ColumnNames {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for ColumnNames {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for ColumnNames {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ColumnNames {
    fn from(names: [&str; N]) -> Self {
        Self(names.into_iter().map(String::from).collect())
    }
}

/// Predictions for one test set, aligned with its test iterator.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// For a single-target benchmark.
    Single(Vec<f64>),
    /// Keyed by target column.
    PerTarget(BTreeMap<String, Vec<f64>>),
}

impl From<Vec<f64>> for Predictions {
    fn from(values: Vec<f64>) -> Self {
        Self::Single(values)
    }
}

impl<const N: usize> From<[(&str, Vec<f64>); N]> for Predictions {
    fn from(columns: [(&str, Vec<f64>); N]) -> Self {
        Self::PerTarget(columns.into_iter().map(|(name, values)| (name.to_string(), values)).collect())
    }
}

/// The result of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    /// Mean over targets, or the metric's own score for multi-output metrics.
    pub aggregate: f64,
    /// Score per target column; empty for multi-output metrics.
    pub per_target: BTreeMap<String, f64>,
}

/// Scores of every metric of a benchmark on one test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub test_set: String,
    pub scores: BTreeMap<String, MetricScore>,
}

impl Scores {
    pub fn get(&self, metric: &str) -> Option<&MetricScore> {
        self.scores.get(metric)
    }

    /// The aggregate score of `metric`.
    pub fn aggregate(&self, metric: &str) -> Option<f64> {
        self.get(metric).map(|s| s.aggregate)
    }
}

/// One row handed to an evaluation harness.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Row index in the dataset.
    pub index: usize,
    /// In input column order.
    pub inputs: Vec<Datum>,
    /// In target column order.
    pub targets: Vec<Datum>,
}

/// Lazily loads the rows of a train or test set, in order.
///
/// A clone carries on from the same position; ask the benchmark for a fresh
/// iterator to replay from the start.
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    benchmark: &'a BenchmarkSpecification,
    indices: &'a [usize],
    position: usize,
}

impl<'a> Iterator for Samples<'a> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let &index = self.indices.get(self.position)?;
        self.position += 1;
        Some(self.benchmark.sample(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.indices.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Samples<'_> {}

#[derive(Debug, Serialize, Deserialize)]
struct PortableSpec {
    dataset: String,
    dataset_checksum: String,
    split: SplitSpec,
    input_cols: Vec<String>,
    target_cols: Vec<String>,
    metrics: Vec<String>,
}

/// A dataset, a split of its rows, the columns to learn from and to predict,
/// and the metrics that score predictions.
///
/// Everything is checked when the specification is built; afterwards it is
/// immutable and only reads its dataset, so it can be shared across threads.
#[derive(Debug)]
pub struct BenchmarkSpecification {
    dataset: Arc<Dataset>,
    split_spec: SplitSpec,
    split: Split,
    input_cols: Vec<String>,
    target_cols: Vec<String>,
    metrics: Vec<Arc<dyn Metric>>,
    checksum: String,
}

impl BenchmarkSpecification {
    pub fn builder(dataset: Arc<Dataset>, split: SplitSpec) -> BenchmarkBuilder {
        BenchmarkBuilder::new(dataset, split)
    }

    /// Checks and assembles a benchmark.
    ///
    /// # Args
    /// - `dataset`: the data; shared, never modified.
    /// - `split`: resolved against `dataset.size()`.
    /// - `input_cols`, `target_cols`: non-empty, existing, disjoint. Targets
    ///     must be numeric `SCALAR` columns.
    /// - `metrics`: names looked up in `registry`. Repeated names count once.
    ///
    /// # Returns
    /// The benchmark, or the first problem found. Columns are checked before
    /// metrics, and metrics before the split.
    pub fn new(
        dataset: Arc<Dataset>,
        split: SplitSpec,
        input_cols: impl Into<ColumnNames>,
        target_cols: impl Into<ColumnNames>,
        metrics: &[&str],
        registry: &MetricRegistry,
    ) -> Result<Self> {
        let input_cols = input_cols.into().into_inner();
        let target_cols = target_cols.into().into_inner();
        check_columns(&dataset, &input_cols, &target_cols)?;

        if metrics.is_empty() {
            return Err(ValidationError::Empty("metrics").into());
        }
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::with_capacity(metrics.len());
        for &name in metrics {
            if !seen.insert(name) {
                log::warn!("metric `{name}` is listed more than once; scoring it once");
                continue;
            }
            let metric = registry.get(name)?;
            if metric.arity() == Arity::MultiOutput && target_cols.len() < 2 {
                return Err(ValidationError::MetricIncompatible {
                    metric: name.to_string(),
                    targets: target_cols.len(),
                }
                .into());
            }
            resolved.push(metric);
        }

        let resolved_split = split.resolve(dataset.size())?;

        let portable = PortableSpec {
            dataset: dataset.name().to_string(),
            dataset_checksum: dataset.checksum().to_string(),
            split: split.clone(),
            input_cols: input_cols.clone(),
            target_cols: target_cols.clone(),
            metrics: resolved.iter().map(|m| m.name().to_string()).collect(),
        };
        let checksum = helpers::digest([serde_json::to_string(&portable)?.as_bytes()]);

        log::info!(
            "benchmark on `{}`: {} train rows, test sets {:?}, inputs {:?}, targets {:?}, metrics {:?}",
            dataset.name(),
            resolved_split.n_train(),
            resolved_split.test_set_names(),
            input_cols,
            target_cols,
            portable.metrics
        );

        Ok(Self {
            dataset,
            split_spec: split,
            split: resolved_split,
            input_cols,
            target_cols,
            metrics: resolved,
            checksum,
        })
    }

    /// Rows of the train set, in split order.
    pub fn train_iterator(&self) -> Samples<'_> {
        Samples {
            benchmark: self,
            indices: self.split.train(),
            position: 0,
        }
    }

    /// Rows of a test set, in split order. The name may be left out only when
    /// the split has a single test set.
    pub fn test_iterator(&self, test_set: Option<&str>) -> Result<Samples<'_>> {
        let set = self.split.test_set(test_set)?;
        Ok(Samples {
            benchmark: self,
            indices: set.indices(),
            position: 0,
        })
    }

    fn sample(&self, index: usize) -> Result<Sample> {
        let load = |columns: &[String]| {
            columns
                .iter()
                .map(|c| self.dataset.get_data(index, c))
                .collect::<Result<Vec<_>>>()
        };
        Ok(Sample {
            index,
            inputs: load(&self.input_cols)?,
            targets: load(&self.target_cols)?,
        })
    }

    /// Scores `predictions` against the targets of a test set.
    ///
    /// Predictions must follow the order of [`Self::test_iterator`] for the
    /// same test set. They are checked in full before any target is read, so
    /// a mismatch returns an error and no scores. Missing target values count
    /// as `NaN`.
    ///
    /// Single-output metrics are computed per target and averaged;
    /// multi-output metrics score all targets at once.
    pub fn evaluate(&self, predictions: &Predictions, test_set: Option<&str>) -> Result<Scores> {
        let set = self.split.test_set(test_set)?;
        let y_pred = self.prediction_table(predictions, set)?;
        let y_true = self.target_table(set)?;

        // One job per (metric, target) pair, or per metric for multi-output ones.
        let jobs = self
            .metrics
            .iter()
            .enumerate()
            .flat_map(|(m, metric)| match metric.arity() {
                Arity::SingleOutput => (0..self.target_cols.len()).map(|t| (m, Some(t))).collect::<Vec<_>>(),
                Arity::MultiOutput => vec![(m, None)],
            })
            .collect::<Vec<_>>();

        let results = jobs
            .par_iter()
            .map(|&(m, target)| {
                let metric = &self.metrics[m];
                match target {
                    Some(t) => metric.score(&y_true.column(t).to_vec(), &y_pred.column(t).to_vec()),
                    None => metric.score_multi(y_true.view(), y_pred.view()),
                }
            })
            .collect::<Vec<_>>();

        let mut scores = BTreeMap::new();
        for (&(m, target), score) in jobs.iter().zip(results) {
            let entry = scores.entry(self.metrics[m].name().to_string()).or_insert_with(|| MetricScore {
                aggregate: score,
                per_target: BTreeMap::new(),
            });
            if let Some(t) = target {
                entry.per_target.insert(self.target_cols[t].clone(), score);
            }
        }
        for score in scores.values_mut() {
            if !score.per_target.is_empty() {
                score.aggregate = helpers::mean(&score.per_target.values().copied().collect::<Vec<_>>());
            }
        }

        log::debug!("evaluated {} predictions on `{}`", set.len(), set.name());
        Ok(Scores {
            test_set: set.name().to_string(),
            scores,
        })
    }

    /// Evaluates every test set, given predictions keyed by test set name.
    /// Either all sets are scored or an error is returned.
    pub fn evaluate_all(&self, predictions: &BTreeMap<String, Predictions>) -> Result<BTreeMap<String, Scores>> {
        if let Some(unknown) = predictions.keys().find(|name| self.split.test_set(Some(name.as_str())).is_err()) {
            return Err(ValidationError::UnknownTestSet(unknown.clone()).into());
        }
        self.split
            .test_sets()
            .iter()
            .map(|set| -> Result<(String, Scores)> {
                let set_predictions = predictions
                    .get(set.name())
                    .ok_or_else(|| ValidationError::MissingPredictions(set.name().to_string()))?;
                Ok((set.name().to_string(), self.evaluate(set_predictions, Some(set.name()))?))
            })
            .collect()
    }

    /// Rows × targets table of predictions, after checking names and lengths.
    fn prediction_table(&self, predictions: &Predictions, set: &TestSet) -> Result<Array2<f64>> {
        let check = |target: &str, values: &[f64]| -> Result<()> {
            if values.len() == set.len() {
                Ok(())
            } else {
                Err(ValidationError::PredictionLength {
                    target: target.to_string(),
                    expected: set.len(),
                    found: values.len(),
                }
                .into())
            }
        };

        let columns = match predictions {
            Predictions::Single(values) => {
                if let Some(second) = self.target_cols.get(1) {
                    return Err(ValidationError::MissingPredictions(second.clone()).into());
                }
                check(&self.target_cols[0], values)?;
                vec![values.as_slice()]
            }
            Predictions::PerTarget(map) => {
                for extra in map.keys().filter(|k| !self.target_cols.contains(*k)) {
                    log::warn!("ignoring predictions for `{extra}`, which is not a target");
                }
                let mut columns = Vec::with_capacity(self.target_cols.len());
                for target in &self.target_cols {
                    let values = map
                        .get(target)
                        .ok_or_else(|| ValidationError::MissingPredictions(target.clone()))?;
                    check(target, values)?;
                    columns.push(values.as_slice());
                }
                columns
            }
        };

        Ok(Array2::from_shape_fn((set.len(), columns.len()), |(r, t)| columns[t][r]))
    }

    fn target_table(&self, set: &TestSet) -> Result<Array2<f64>> {
        let mut table = Array2::from_elem((set.len(), self.target_cols.len()), f64::NAN);
        for (r, &row) in set.indices().iter().enumerate() {
            for (t, target) in self.target_cols.iter().enumerate() {
                if let Some(v) = self.dataset.get_data(row, target)?.as_f64() {
                    table[[r, t]] = v;
                }
            }
        }
        Ok(table)
    }

    /// Portable JSON form: the split as given, the columns, the metric names,
    /// and the dataset's name and checksum.
    pub fn to_json(&self) -> Result<String> {
        let portable = PortableSpec {
            dataset: self.dataset.name().to_string(),
            dataset_checksum: self.dataset.checksum().to_string(),
            split: self.split_spec.clone(),
            input_cols: self.input_cols.clone(),
            target_cols: self.target_cols.clone(),
            metrics: self.metric_names().into_iter().map(String::from).collect(),
        };
        Ok(serde_json::to_string_pretty(&portable)?)
    }

    /// Rebuilds a benchmark from [`Self::to_json`] output. `dataset` must be
    /// the same dataset, by checksum.
    pub fn from_json(json: &str, dataset: Arc<Dataset>, registry: &MetricRegistry) -> Result<Self> {
        let portable: PortableSpec = serde_json::from_str(json)?;
        if portable.dataset_checksum != dataset.checksum() {
            return Err(ValidationError::ChecksumMismatch {
                expected: portable.dataset_checksum,
                found: dataset.checksum().to_string(),
            }
            .into());
        }
        let metrics = portable.metrics.iter().map(String::as_str).collect::<Vec<_>>();
        Self::new(dataset, portable.split, portable.input_cols, portable.target_cols, &metrics, registry)
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    pub fn split_spec(&self) -> &SplitSpec {
        &self.split_spec
    }

    pub fn input_cols(&self) -> &[String] {
        &self.input_cols
    }

    pub fn target_cols(&self) -> &[String] {
        &self.target_cols
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    pub fn is_multi_task(&self) -> bool {
        self.target_cols.len() > 1
    }

    /// Hex SHA-256 over the dataset checksum, split, columns and metrics.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

fn check_columns(dataset: &Dataset, input_cols: &[String], target_cols: &[String]) -> Result<()> {
    if input_cols.is_empty() {
        return Err(ValidationError::Empty("input columns").into());
    }
    if target_cols.is_empty() {
        return Err(ValidationError::Empty("target columns").into());
    }

    for columns in [input_cols, target_cols] {
        let mut seen = BTreeSet::new();
        for column in columns {
            if !dataset.has_column(column) {
                return Err(ValidationError::ColumnNotFound(column.clone()).into());
            }
            if !seen.insert(column) {
                return Err(ValidationError::DuplicateColumn(column.clone()).into());
            }
        }
    }

    if let Some(both) = input_cols.iter().find(|c| target_cols.contains(c)) {
        return Err(ValidationError::ColumnRole(both.clone()).into());
    }

    for target in target_cols {
        let numeric = dataset.modality(target)? == Modality::Scalar && dataset.column_kind(target)?.is_numeric();
        if !numeric {
            return Err(ValidationError::TargetNotNumeric(target.clone()).into());
        }
    }
    Ok(())
}

/// Collects the parts of a [`BenchmarkSpecification`].
///
/// ```ignore
/// let benchmark = BenchmarkSpecification::builder(dataset, SplitSpec::fractions(0.8, 42))
///     .input_cols("smiles")
///     .target_cols(["expt", "calc"])
///     .metrics(["mean_absolute_error"])
///     .build(&MetricRegistry::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct BenchmarkBuilder {
    dataset: Arc<Dataset>,
    split: SplitSpec,
    input_cols: ColumnNames,
    target_cols: ColumnNames,
    metrics: Vec<String>,
}

impl BenchmarkBuilder {
    pub fn new(dataset: Arc<Dataset>, split: SplitSpec) -> Self {
        Self {
            dataset,
            split,
            input_cols: ColumnNames::default(),
            target_cols: ColumnNames::default(),
            metrics: Vec::new(),
        }
    }

    pub fn input_cols(mut self, columns: impl Into<ColumnNames>) -> Self {
        self.input_cols = columns.into();
        self
    }

    pub fn target_cols(mut self, columns: impl Into<ColumnNames>) -> Self {
        self.target_cols = columns.into();
        self
    }

    pub fn metrics<S: Into<String>>(mut self, metrics: impl IntoIterator<Item = S>) -> Self {
        self.metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self, registry: &MetricRegistry) -> Result<BenchmarkSpecification> {
        let metrics = self.metrics.iter().map(String::as_str).collect::<Vec<_>>();
        BenchmarkSpecification::new(self.dataset, self.split, self.input_cols, self.target_cols, &metrics, registry)
    }
}

//! Provides the `Metric` trait, the built-in scoring functions and the
//! registry that looks them up by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::ArrayView2;

use crate::error::{Result, ValidationError};
use crate::utils::helpers::{mean, sd};

/// Whether a metric scores one target column at a time or all of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    SingleOutput,
    /// Scores the whole rows × targets table in one go; only valid for
    /// multi-target benchmarks.
    MultiOutput,
}

/// A `Metric` compares true values with predictions and deterministically
/// produces a score.
pub trait Metric: std::fmt::Debug + Send + Sync {
    /// The identifier benchmarks refer to the metric by.
    fn name(&self) -> &str;

    fn arity(&self) -> Arity {
        Arity::SingleOutput
    }

    /// Score of one target column. Both slices have the same length.
    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64;

    /// Score of a rows × targets table. The default is the mean of the
    /// per-column scores.
    fn score_multi(&self, y_true: ArrayView2<f64>, y_pred: ArrayView2<f64>) -> f64 {
        let scores = y_true
            .columns()
            .into_iter()
            .zip(y_pred.columns())
            .map(|(t, p)| self.score(&t.to_vec(), &p.to_vec()))
            .collect::<Vec<_>>();
        mean(&scores)
    }
}

fn pairs<'a>(y_true: &'a [f64], y_pred: &'a [f64]) -> impl Iterator<Item = (f64, f64)> + 'a {
    y_true.iter().copied().zip(y_pred.iter().copied())
}

#[derive(Debug)]
pub struct MeanAbsoluteError;

impl Metric for MeanAbsoluteError {
    fn name(&self) -> &str {
        "mean_absolute_error"
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        pairs(y_true, y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / y_true.len() as f64
    }
}

#[derive(Debug)]
pub struct MeanSquaredError;

impl Metric for MeanSquaredError {
    fn name(&self) -> &str {
        "mean_squared_error"
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        pairs(y_true, y_pred).map(|(t, p)| (t - p) * (t - p)).sum::<f64>() / y_true.len() as f64
    }
}

#[derive(Debug)]
pub struct RootMeanSquaredError;

impl Metric for RootMeanSquaredError {
    fn name(&self) -> &str {
        "root_mean_squared_error"
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        MeanSquaredError.score(y_true, y_pred).sqrt()
    }
}

/// Coefficient of determination. A constant target scores 1 when predicted
/// exactly and 0 otherwise.
#[derive(Debug)]
pub struct R2;

impl Metric for R2 {
    fn name(&self) -> &str {
        "r2"
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        let m = mean(y_true);
        let ss_res = pairs(y_true, y_pred).map(|(t, p)| (t - p) * (t - p)).sum::<f64>();
        let ss_tot = y_true.iter().map(|t| (t - m) * (t - m)).sum::<f64>();
        if ss_tot == 0. {
            if ss_res == 0. {
                1.
            } else {
                0.
            }
        } else {
            1. - ss_res / ss_tot
        }
    }
}

/// Pearson correlation coefficient. `NaN` if either side is constant.
#[derive(Debug)]
pub struct PearsonR;

impl Metric for PearsonR {
    fn name(&self) -> &str {
        "pearsonr"
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        let (mt, mp) = (mean(y_true), mean(y_pred));
        let (st, sp) = (sd(y_true, mt), sd(y_pred, mp));
        if st == 0. || sp == 0. {
            return f64::NAN;
        }
        let cov = pairs(y_true, y_pred).map(|(t, p)| (t - mt) * (p - mp)).sum::<f64>() / y_true.len() as f64;
        cov / (st * sp)
    }
}

/// Fraction of rows whose rounded prediction equals the (integer) label.
#[derive(Debug)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        let hits = pairs(y_true, y_pred).filter(|&(t, p)| p.round() == t).count();
        hits as f64 / y_true.len() as f64
    }
}

/// Mean squared error over every cell of a multi-target table.
#[derive(Debug)]
pub struct MultitaskMeanSquaredError;

impl Metric for MultitaskMeanSquaredError {
    fn name(&self) -> &str {
        "multitask_mean_squared_error"
    }

    fn arity(&self) -> Arity {
        Arity::MultiOutput
    }

    fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        MeanSquaredError.score(y_true, y_pred)
    }

    fn score_multi(&self, y_true: ArrayView2<f64>, y_pred: ArrayView2<f64>) -> f64 {
        let diff = &y_true - &y_pred;
        diff.mapv(|d| d * d).mean().unwrap_or(f64::NAN)
    }
}

/// Immutable lookup table from metric name to metric.
///
/// `Default` holds the built-in metrics. Build it once, add custom metrics
/// with [`MetricRegistry::with_metric`], then share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: BTreeMap<String, Arc<dyn Metric>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::empty()
            .with_metric(MeanAbsoluteError)
            .with_metric(MeanSquaredError)
            .with_metric(RootMeanSquaredError)
            .with_metric(R2)
            .with_metric(PearsonR)
            .with_metric(Accuracy)
            .with_metric(MultitaskMeanSquaredError)
    }
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self {
            metrics: BTreeMap::new(),
        }
    }

    /// Adds `metric`, replacing any metric of the same name.
    pub fn with_metric<M: Metric + 'static>(mut self, metric: M) -> Self {
        self.metrics.insert(metric.name().to_string(), Arc::new(metric));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Metric>> {
        self.metrics
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownMetric(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.metrics.keys().map(String::as_str).collect()
    }
}

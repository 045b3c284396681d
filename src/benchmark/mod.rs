//! The evaluation contract layered on a [`Dataset`](crate::Dataset): splits,
//! metrics, and the benchmark specification tying them together.

pub mod metric;
mod specification;
mod split;

pub use metric::{Arity, Metric, MetricRegistry};
pub use specification::{BenchmarkBuilder, BenchmarkSpecification, ColumnNames, MetricScore, Predictions, Sample, Samples, Scores};
pub use split::{Split, SplitSpec, TestIndices, TestSet};

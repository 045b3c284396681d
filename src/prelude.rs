//! Common imports from assay.

pub use crate::data::ArrayStore;
pub use crate::data::Dataset;
pub use crate::data::Datum;
pub use crate::data::Modality;
pub use crate::data::ModalityRegistry;
pub use crate::data::Table;
pub use crate::data::Value;

pub use crate::benchmark::BenchmarkSpecification;
pub use crate::benchmark::Metric;
pub use crate::benchmark::MetricRegistry;
pub use crate::benchmark::Predictions;
pub use crate::benchmark::SplitSpec;

pub use crate::{Error, Result};

//! assay: benchmark datasets for evaluating predictive methods.
//!
//! A [`Dataset`] is a set of named columns, each tagged with a [`Modality`]
//! (scalar, molecule, 3D structure, image or generic array). Columns are either
//! held in memory or backed by chunks in an [`ArrayStore`], fetched on first
//! touch and kept in a per-dataset cache.
//!
//! A [`BenchmarkSpecification`] fixes a train/test [`Split`], the input and
//! target columns, and the metrics used to score predictions, so that results
//! are comparable across methods and reproducible across runs.

mod error;

pub mod benchmark;
pub mod constants;
pub mod data;
pub mod prelude;
pub mod utils;

pub use error::{Error, Result, StorageError, ValidationError};

pub use data::{
    ArrayStore, Column, ColumnStore, ChunkCache, ChunkKey, ChunkLayout, CacheStats, Dataset,
    DatasetBuilder, DatasetInfo, Datum, Decoder, DirectoryStore, GroupMetadata, Image, MemoryStore,
    Modality, ModalityRegistry, ModalityRule, Molecule, StorageKind, Table, Value, WritableStore,
};

pub use benchmark::{
    Arity, BenchmarkBuilder, BenchmarkSpecification, ColumnNames, Metric, MetricRegistry,
    MetricScore, Predictions, Sample, Samples, Scores, Split, SplitSpec, TestIndices, TestSet,
};

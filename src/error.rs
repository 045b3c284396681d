//! Errors raised while building, opening and evaluating benchmark datasets.
//!
//! Validation errors come from caller input and are raised before any object
//! reaches its ready state. Storage errors come from the array store or from a
//! decoder handing back malformed or missing data.

use std::path::PathBuf;

use thiserror::Error;

use crate::data::{Modality, StorageKind};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// The validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Storage(_) => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(StorageError::Json(e))
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::Storage(StorageError::Csv(e))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unknown modality tag `{0}`")]
    UnknownModality(String),

    #[error("column `{column}` is annotated as {annotated} but stores {stored} values")]
    AnnotationMismatch {
        column: String,
        annotated: Modality,
        stored: StorageKind,
    },

    #[error("column `{0}` not found")]
    ColumnNotFound(String),

    #[error("column `{column}` has {found} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("column `{column}` mixes {expected} and {found} values (row {row})")]
    MixedKinds {
        column: String,
        row: usize,
        expected: StorageKind,
        found: StorageKind,
    },

    #[error("column `{0}` is defined more than once")]
    DuplicateColumn(String),

    #[error("index {index} appears more than once in `{set}`")]
    DuplicateIndex { set: String, index: usize },

    #[error("train set and `{set}` share indices {indices:?}")]
    Overlap { set: String, indices: Vec<usize> },

    #[error("index {index} in `{context}` is out of range for {length} rows")]
    IndexOutOfRange {
        context: String,
        index: usize,
        length: usize,
    },

    #[error("train fraction {0} is not in (0, 1)")]
    InvalidFraction(f64),

    #[error("test set `{0}` is empty")]
    EmptyTestSet(String),

    #[error("metric `{0}` is not registered")]
    UnknownMetric(String),

    #[error("metric `{metric}` cannot score {targets} target column(s)")]
    MetricIncompatible { metric: String, targets: usize },

    #[error("no {0} given")]
    Empty(&'static str),

    #[error("column `{0}` is used both as input and as target")]
    ColumnRole(String),

    #[error("target column `{0}` is not a numeric scalar column")]
    TargetNotNumeric(String),

    #[error("split has several test sets {0:?}; a test set name is required")]
    AmbiguousTestSet(Vec<String>),

    #[error("test set `{0}` not found")]
    UnknownTestSet(String),

    #[error("expected {expected} predictions for `{target}`, got {found}")]
    PredictionLength {
        target: String,
        expected: usize,
        found: usize,
    },

    #[error("no predictions given for `{0}`")]
    MissingPredictions(String),

    #[error("dataset checksum {found} does not match the expected {expected}")]
    ChecksumMismatch { expected: String, found: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("malformed archive at {location}: {reason}")]
    ArchiveFormat { location: String, reason: String },

    #[error("archive at {location} is missing {entity}")]
    Schema { location: String, entity: String },

    #[error("`{name}` cannot name an archive entry: {reason}")]
    EntryName { name: String, reason: &'static str },

    #[error("cannot load row {row} of column `{column}`: {reason}")]
    ModalityLoad {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("i/o error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read array {}: {source}", .path.display())]
    NpyRead {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    #[error("cannot write array {}: {source}", .path.display())]
    NpyWrite {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl StorageError {
    pub(crate) fn format(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArchiveFormat {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(location: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::Schema {
            location: location.into(),
            entity: entity.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

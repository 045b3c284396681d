//! Chunked array archives.
//!
//! An archive is a set of named groups, each holding named `f64` arrays, plus
//! a JSON attribute block at the root. The dataset layer only talks to the
//! [`ArrayStore`] trait; [`DirectoryStore`] keeps an archive on disk and
//! [`MemoryStore`] keeps one in process.

mod directory;
mod memory;
mod metadata;

use ndarray::ArrayD;
use serde_json::{Map, Value as JsonValue};

use crate::error::{Result, StorageError};

pub use directory::DirectoryStore;
pub use memory::MemoryStore;
pub use metadata::{ChunkLayout, GroupMetadata};

pub(crate) use metadata::RootAttributes;

/// Read access to an archive.
///
/// Implementations must be safe to share across threads. A read either returns
/// data or a typed error; retries and timeouts are the store's own business.
pub trait ArrayStore: std::fmt::Debug + Send + Sync {
    /// Human readable location, used in error messages.
    fn location(&self) -> String;

    /// The root attribute block.
    fn attributes(&self) -> Result<Map<String, JsonValue>>;

    /// Names of the groups at the root, sorted.
    fn groups(&self) -> Result<Vec<String>>;

    fn group_metadata(&self, group: &str) -> Result<GroupMetadata>;

    /// Reads one array, i.e. one chunk.
    fn read_array(&self, group: &str, name: &str) -> Result<ArrayD<f64>>;
}

/// Write access to an archive.
pub trait WritableStore: ArrayStore {
    fn write_attributes(&mut self, attributes: &Map<String, JsonValue>) -> Result<()>;

    fn write_group_metadata(&mut self, group: &str, metadata: &GroupMetadata) -> Result<()>;

    fn write_array(&mut self, group: &str, name: &str, array: &ArrayD<f64>) -> Result<()>;
}

/// Checks that `name` can be written as a group or array name: a single
/// non-empty path component that does not start with `.`.
pub(crate) fn check_entry_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.contains(&['/', '\\'][..]) {
        "contains a path separator"
    } else if name.starts_with('.') {
        "starts with `.`"
    } else if name.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(StorageError::EntryName {
        name: name.to_string(),
        reason,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names() {
        for name in ["A", "fingerprint", "conformer_3d", "0", "a..b"] {
            assert!(check_entry_name(name).is_ok(), "{name}");
        }
        for name in ["", ".fp", "..", ".", "../escape", "a/b", "a\\b", "nul\0"] {
            let err = check_entry_name(name).unwrap_err();
            assert!(matches!(err, crate::Error::Storage(StorageError::EntryName { .. })), "{name}: {err}");
        }
    }
}

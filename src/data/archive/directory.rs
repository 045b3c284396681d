use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use serde_json::{Map, Value as JsonValue};

use super::{check_entry_name, ArrayStore, GroupMetadata, WritableStore};
use crate::constants::{ARRAY_EXTENSION, ATTRIBUTES_FILENAME, GROUP_METADATA_FILENAME};
use crate::error::{Result, StorageError};

/// An archive kept as a directory tree:
///
/// ```text
/// data.archive/
/// ├── .attrs.json        root attributes
/// ├── A/
/// │   ├── .group.json    layout and array shapes
/// │   ├── 0.npy
/// │   └── 1.npy
/// └── B/
///     ├── .group.json
///     └── data.npy
/// ```
///
/// Arrays are `.npy` files. `f64` is the native element type; `f32` files are
/// widened on read.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens an existing archive.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join(ATTRIBUTES_FILENAME).is_file() {
            return Err(StorageError::format(
                root.display().to_string(),
                format!("no `{ATTRIBUTES_FILENAME}` file; not an archive"),
            )
            .into());
        }
        Ok(Self { root })
    }

    /// Creates an empty archive. The directory may exist but must be empty.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        let mut entries = fs::read_dir(&root).map_err(|e| StorageError::io(&root, e))?;
        if entries.next().is_some() {
            return Err(StorageError::format(root.display().to_string(), "directory is not empty").into());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn array_path(&self, group: &str, name: &str) -> PathBuf {
        self.root.join(group).join(format!("{name}.{ARRAY_EXTENSION}"))
    }

    fn read_json(&self, path: &Path) -> Result<JsonValue> {
        let text = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_json(&self, path: &Path, value: &JsonValue) -> Result<()> {
        let text = serde_json::to_string_pretty(value)?;
        fs::write(path, text).map_err(|e| StorageError::io(path, e).into())
    }
}

impl ArrayStore for DirectoryStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn attributes(&self) -> Result<Map<String, JsonValue>> {
        match self.read_json(&self.root.join(ATTRIBUTES_FILENAME))? {
            JsonValue::Object(map) => Ok(map),
            other => Err(StorageError::format(self.location(), format!("root attributes are not an object: {other}")).into()),
        }
    }

    fn groups(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;

        let mut groups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            let is_dir = entry.file_type().map_err(|e| StorageError::io(entry.path(), e))?.is_dir();
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir && !name.starts_with('.') {
                groups.push(name);
            }
        }
        groups.sort();
        Ok(groups)
    }

    fn group_metadata(&self, group: &str) -> Result<GroupMetadata> {
        let path = self.root.join(group).join(GROUP_METADATA_FILENAME);
        if !path.is_file() {
            return Err(StorageError::schema(self.location(), format!("metadata of group `{group}`")).into());
        }
        Ok(serde_json::from_value(self.read_json(&path)?)?)
    }

    fn read_array(&self, group: &str, name: &str) -> Result<ArrayD<f64>> {
        let path = self.array_path(group, name);
        if !path.is_file() {
            return Err(StorageError::schema(self.location(), format!("array `{group}/{name}`")).into());
        }
        log::debug!("reading {}", path.display());

        match ndarray_npy::read_npy::<_, ArrayD<f64>>(&path) {
            Ok(array) => Ok(array),
            Err(source) => ndarray_npy::read_npy::<_, ArrayD<f32>>(&path)
                .map(|array| array.mapv(f64::from))
                .map_err(|_| StorageError::NpyRead { path, source }.into()),
        }
    }
}

impl WritableStore for DirectoryStore {
    fn write_attributes(&mut self, attributes: &Map<String, JsonValue>) -> Result<()> {
        self.write_json(&self.root.join(ATTRIBUTES_FILENAME), &JsonValue::Object(attributes.clone()))
    }

    fn write_group_metadata(&mut self, group: &str, metadata: &GroupMetadata) -> Result<()> {
        check_entry_name(group)?;
        let dir = self.root.join(group);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        self.write_json(&dir.join(GROUP_METADATA_FILENAME), &serde_json::to_value(metadata)?)
    }

    fn write_array(&mut self, group: &str, name: &str, array: &ArrayD<f64>) -> Result<()> {
        check_entry_name(group)?;
        check_entry_name(name)?;
        let dir = self.root.join(group);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        let path = self.array_path(group, name);
        ndarray_npy::write_npy(&path, array).map_err(|source| StorageError::NpyWrite { path, source }.into())
    }
}

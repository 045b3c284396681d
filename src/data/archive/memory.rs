use std::collections::BTreeMap;

use ndarray::ArrayD;
use serde_json::{Map, Value as JsonValue};

use super::{check_entry_name, ArrayStore, GroupMetadata, WritableStore};
use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Default)]
struct MemoryGroup {
    metadata: Option<GroupMetadata>,
    arrays: BTreeMap<String, ArrayD<f64>>,
}

/// An archive held entirely in process memory. Handy for tests and for
/// datasets assembled on the fly.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    attributes: Map<String, JsonValue>,
    groups: BTreeMap<String, MemoryGroup>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArrayStore for MemoryStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn attributes(&self) -> Result<Map<String, JsonValue>> {
        Ok(self.attributes.clone())
    }

    fn groups(&self) -> Result<Vec<String>> {
        Ok(self.groups.keys().cloned().collect())
    }

    fn group_metadata(&self, group: &str) -> Result<GroupMetadata> {
        self.groups
            .get(group)
            .and_then(|g| g.metadata.clone())
            .ok_or_else(|| StorageError::schema(self.location(), format!("metadata of group `{group}`")).into())
    }

    fn read_array(&self, group: &str, name: &str) -> Result<ArrayD<f64>> {
        self.groups
            .get(group)
            .and_then(|g| g.arrays.get(name))
            .cloned()
            .ok_or_else(|| StorageError::schema(self.location(), format!("array `{group}/{name}`")).into())
    }
}

impl WritableStore for MemoryStore {
    fn write_attributes(&mut self, attributes: &Map<String, JsonValue>) -> Result<()> {
        self.attributes = attributes.clone();
        Ok(())
    }

    fn write_group_metadata(&mut self, group: &str, metadata: &GroupMetadata) -> Result<()> {
        check_entry_name(group)?;
        self.groups.entry(group.to_string()).or_default().metadata = Some(metadata.clone());
        Ok(())
    }

    fn write_array(&mut self, group: &str, name: &str, array: &ArrayD<f64>) -> Result<()> {
        check_entry_name(group)?;
        check_entry_name(name)?;
        self.groups
            .entry(group.to_string())
            .or_default()
            .arrays
            .insert(name.to_string(), array.clone());
        Ok(())
    }
}

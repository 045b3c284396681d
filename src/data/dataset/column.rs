//! The column store: resolves (column, row) to a stored [`Value`], reading
//! chunked columns through the [`ArrayStore`] on first touch.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{ArrayD, Axis};

use super::cache::{ChunkCache, ChunkKey};
use crate::constants::WHOLE_ARRAY_NAME;
use crate::data::archive::{ArrayStore, ChunkLayout, GroupMetadata};
use crate::data::value::{StorageKind, Value};
use crate::error::{Result, StorageError, ValidationError};

/// A reference into chunked storage: the group holding the column and how it
/// is split into chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedColumn {
    group: String,
    layout: ChunkLayout,
    rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Storage {
    Memory(Vec<Value>),
    Chunked(ChunkedColumn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: StorageKind,
    storage: Storage,
}

impl Column {
    /// A fully materialized column.
    ///
    /// The column's kind is the common kind of its non-null values (ints and
    /// floats mix into floats); an all-null or empty column counts as float.
    pub fn memory(name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        let mut kind: Option<StorageKind> = None;
        for (row, value) in values.iter().enumerate() {
            let Some(found) = value.kind() else { continue };
            kind = match kind {
                None => Some(found),
                Some(expected) => Some(expected.unify(found).ok_or_else(|| ValidationError::MixedKinds {
                    column: name.clone(),
                    row,
                    expected,
                    found,
                })?),
            };
        }
        Ok(Self {
            name,
            kind: kind.unwrap_or(StorageKind::Float),
            storage: Storage::Memory(values),
        })
    }

    /// A column backed by the arrays of `group` in an archive.
    pub fn chunked(name: impl Into<String>, group: impl Into<String>, metadata: &GroupMetadata, location: &str) -> Result<Self> {
        let group = group.into();
        let rows = metadata
            .rows()
            .map_err(|reason| StorageError::format(location, format!("group `{group}`: {reason}")))?;
        Ok(Self {
            name: name.into(),
            kind: StorageKind::Array,
            storage: Storage::Chunked(ChunkedColumn {
                group,
                layout: metadata.layout,
                rows,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Memory(values) => values.len(),
            Storage::Chunked(c) => c.rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.storage, Storage::Chunked(_))
    }

    /// The chunk layout, for chunked columns.
    pub fn layout(&self) -> Option<ChunkLayout> {
        match &self.storage {
            Storage::Memory(_) => None,
            Storage::Chunked(c) => Some(c.layout),
        }
    }

    /// Materialized values, for in-memory columns.
    pub fn values(&self) -> Option<&[Value]> {
        match &self.storage {
            Storage::Memory(values) => Some(values),
            Storage::Chunked(_) => None,
        }
    }
}

/// Maps column names to columns, all of the same length.
#[derive(Debug)]
pub struct ColumnStore {
    columns: Vec<Column>,
    positions: HashMap<String, usize>,
    rows: usize,
    store: Option<Arc<dyn ArrayStore>>,
    cache: ChunkCache,
}

impl ColumnStore {
    /// Builds the store, checking that names are unique, that every column
    /// has the same length, and that chunked columns have an array store to
    /// read from.
    pub fn new(columns: Vec<Column>, store: Option<Arc<dyn ArrayStore>>) -> Result<Self> {
        let rows = columns.first().map_or(0, Column::len);
        let mut positions = HashMap::with_capacity(columns.len());

        for (i, column) in columns.iter().enumerate() {
            if positions.insert(column.name.clone(), i).is_some() {
                return Err(ValidationError::DuplicateColumn(column.name.clone()).into());
            }
            if column.len() != rows {
                return Err(ValidationError::ColumnLength {
                    column: column.name.clone(),
                    expected: rows,
                    found: column.len(),
                }
                .into());
            }
            if column.is_chunked() && store.is_none() {
                return Err(StorageError::schema("<none>", format!("an array store for chunked column `{}`", column.name)).into());
            }
        }

        Ok(Self {
            columns,
            positions,
            rows,
            store,
            cache: ChunkCache::new(),
        })
    }

    /// The value at (`column`, `row`).
    ///
    /// A chunked column costs one store read per chunk on first touch; later
    /// reads of the same chunk are served by the cache.
    pub fn get(&self, column: &str, row: usize) -> Result<Value> {
        let column = self.column(column)?;
        if row >= self.rows {
            return Err(ValidationError::IndexOutOfRange {
                context: column.name.clone(),
                index: row,
                length: self.rows,
            }
            .into());
        }

        match &column.storage {
            Storage::Memory(values) => Ok(values[row].clone()),
            Storage::Chunked(chunked) => {
                let chunk = self.chunk(column, chunked, row)?;
                match chunked.layout {
                    ChunkLayout::PerRow => Ok(Value::Array(chunk.as_ref().clone())),
                    ChunkLayout::Whole => {
                        if chunk.ndim() == 0 || chunk.len_of(Axis(0)) <= row {
                            return Err(StorageError::format(
                                self.location(),
                                format!("array `{}/{WHOLE_ARRAY_NAME}` has shape {:?}, expected {} rows", chunked.group, chunk.shape(), self.rows),
                            )
                            .into());
                        }
                        Ok(Value::Array(chunk.index_axis(Axis(0), row).to_owned()))
                    }
                }
            }
        }
    }

    /// Every chunk of a chunked column, in order. Used when copying a column
    /// to another archive.
    pub(crate) fn chunks(&self, column: &Column) -> Result<Vec<Arc<ArrayD<f64>>>> {
        match &column.storage {
            Storage::Memory(_) => Ok(Vec::new()),
            Storage::Chunked(chunked) => match chunked.layout {
                ChunkLayout::Whole => Ok(vec![self.chunk(column, chunked, 0)?]),
                ChunkLayout::PerRow => (0..chunked.rows).map(|row| self.chunk(column, chunked, row)).collect(),
            },
        }
    }

    fn chunk(&self, column: &Column, chunked: &ChunkedColumn, row: usize) -> Result<Arc<ArrayD<f64>>> {
        let (chunk, array_name) = match chunked.layout {
            ChunkLayout::Whole => (0, WHOLE_ARRAY_NAME.to_string()),
            ChunkLayout::PerRow => (row, row.to_string()),
        };
        let key = ChunkKey {
            column: column.name.clone(),
            chunk,
        };
        self.cache.get_or_fetch(&key, || match &self.store {
            Some(store) => store.read_array(&chunked.group, &array_name),
            None => Err(StorageError::schema("<none>", format!("an array store for chunked column `{}`", column.name)).into()),
        })
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.positions
            .get(name)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| ValidationError::ColumnNotFound(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Row count, shared by every column.
    pub fn length(&self) -> usize {
        self.rows
    }

    pub fn store(&self) -> Option<&Arc<dyn ArrayStore>> {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    fn location(&self) -> String {
        self.store.as_ref().map_or_else(|| "<none>".to_string(), |s| s.location())
    }
}

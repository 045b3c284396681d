use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use ndarray::{ArrayView, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use super::cache::CacheStats;
use super::column::{Column, ColumnStore};
use crate::constants::WHOLE_ARRAY_NAME;
use crate::data::archive::{check_entry_name, ArrayStore, ChunkLayout, DirectoryStore, GroupMetadata, RootAttributes, WritableStore};
use crate::data::modality::{Datum, Modality, ModalityRegistry};
use crate::data::table::Table;
use crate::data::value::{StorageKind, Value};
use crate::error::{Result, StorageError, ValidationError};
use crate::utils::helpers;

/// Descriptive metadata carried by every dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub description: String,
    /// Where the data came from, e.g. a citation or a URL.
    pub source: String,
}

impl DatasetInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source: source.into(),
        }
    }
}

/// A set of named, equally long columns, each with a modality, plus the
/// metadata describing where the data came from.
///
/// A `Dataset` is immutable once built. Values are read through
/// [`Dataset::get_data`], which loads the stored value through the column's
/// modality rule so that callers always see domain objects. Columns backed by
/// an archive are read chunk by chunk on first touch and cached for the life of
/// the dataset.
///
/// Share it across threads behind an `Arc`; the chunk cache is the only
/// interior state and it is synchronized.
#[derive(Debug)]
pub struct Dataset {
    info: DatasetInfo,
    annotations: BTreeMap<String, Modality>,
    modalities: HashMap<String, Modality>,
    columns: ColumnStore,
    registry: Arc<ModalityRegistry>,
    checksum: String,
}

impl Dataset {
    /// Builds a dataset from an in-memory table.
    ///
    /// # Args
    /// - `table`: the columns; their names become the dataset's column names.
    /// - `info`: name, description and source.
    /// - `annotations`: modality of each annotated column. Columns left out are
    ///     `SCALAR`, or `ARRAY` if they hold arrays.
    /// - `registry`: the modality rules used to check and load values.
    ///
    /// # Returns
    /// The dataset, or the first problem found: an annotation naming an absent
    /// column, an annotation the column's storage cannot carry, or a value its
    /// modality rejects.
    pub fn new(
        table: Table,
        info: DatasetInfo,
        annotations: BTreeMap<String, Modality>,
        registry: Arc<ModalityRegistry>,
    ) -> Result<Self> {
        let columns = table
            .into_columns()
            .map(|(name, values)| Column::memory(name, values))
            .collect::<Result<Vec<_>>>()?;
        let dataset = Self::assemble(info, annotations, ColumnStore::new(columns, None)?, registry)?;
        log::info!(
            "built dataset `{}` with {} rows and {} columns",
            dataset.name(),
            dataset.size(),
            dataset.columns.columns().len()
        );
        Ok(dataset)
    }

    pub fn builder(name: impl Into<String>) -> DatasetBuilder {
        DatasetBuilder::new(name)
    }

    /// Opens a directory archive written by [`Dataset::write`].
    pub fn open(path: impl AsRef<Path>, registry: Arc<ModalityRegistry>) -> Result<Self> {
        let store = DirectoryStore::open(path)?;
        Self::open_store(Arc::new(store), registry)
    }

    /// Reconstructs a dataset from any archive.
    ///
    /// Name, description, source and annotations come from the root
    /// attributes; scalar columns are read from the attributes right away and
    /// every group becomes a chunked column named after it. No array is read
    /// here.
    ///
    /// # Returns
    /// The dataset, an `ArchiveFormat` error if the attributes are missing or
    /// malformed, or a `Schema` error if the annotations or the column order
    /// name a column the archive does not hold.
    pub fn open_store(store: Arc<dyn ArrayStore>, registry: Arc<ModalityRegistry>) -> Result<Self> {
        let location = store.location();
        let attributes = RootAttributes::parse(&location, store.attributes()?)?;

        let mut columns = BTreeMap::new();
        for (name, values) in attributes.columns {
            columns.insert(name.clone(), Column::memory(name, values)?);
        }
        for group in store.groups()? {
            let metadata = store.group_metadata(&group)?;
            let column = Column::chunked(group.clone(), group.clone(), &metadata, &location)?;
            if columns.insert(group.clone(), column).is_some() {
                return Err(StorageError::format(&location, format!("`{group}` is both an attribute column and a group")).into());
            }
        }

        let mut ordered = Vec::with_capacity(columns.len());
        if let Some(order) = &attributes.order {
            for name in order {
                let column = columns
                    .remove(name)
                    .ok_or_else(|| StorageError::schema(&location, format!("column `{name}` listed in the column order")))?;
                ordered.push(column);
            }
            if !columns.is_empty() {
                log::warn!("{location}: columns {:?} are not in the column order; appending them", columns.keys().collect::<Vec<_>>());
            }
        }
        ordered.extend(columns.into_values());

        let mut annotations = BTreeMap::new();
        for (name, tag) in &attributes.annotations {
            if !ordered.iter().any(|c| c.name() == name.as_str()) {
                return Err(StorageError::schema(&location, format!("column `{name}` named in the annotations")).into());
            }
            annotations.insert(name.clone(), tag.parse::<Modality>()?);
        }

        let column_store = ColumnStore::new(ordered, Some(store))?;
        let dataset = Self::assemble(attributes.info, annotations, column_store, registry)?;
        log::info!(
            "opened dataset `{}` from {location}: {} rows, {} columns",
            dataset.name(),
            dataset.size(),
            dataset.columns.columns().len()
        );
        Ok(dataset)
    }

    fn assemble(
        info: DatasetInfo,
        annotations: BTreeMap<String, Modality>,
        columns: ColumnStore,
        registry: Arc<ModalityRegistry>,
    ) -> Result<Self> {
        let mut modalities = HashMap::with_capacity(columns.columns().len());

        for column in columns.columns() {
            let annotated = annotations.get(column.name()).copied();
            let modality = annotated.unwrap_or_else(|| Modality::default_for(column.kind()));
            if !modality.accepts(column.kind()) {
                return Err(ValidationError::AnnotationMismatch {
                    column: column.name().to_string(),
                    annotated: modality,
                    stored: column.kind(),
                }
                .into());
            }

            // Chunked values are checked when loaded.
            if let Some(values) = column.values() {
                let rule = registry.rule(modality);
                if let Some(row) = values.iter().position(|v| !rule.validate(v)) {
                    return Err(StorageError::ModalityLoad {
                        column: column.name().to_string(),
                        row,
                        reason: format!("`{}` is not a valid {modality} value", values[row]),
                    }
                    .into());
                }
            }
            modalities.insert(column.name().to_string(), modality);
        }

        if let Some(absent) = annotations.keys().find(|name| !columns.contains(name)) {
            return Err(ValidationError::ColumnNotFound(absent.clone()).into());
        }

        let checksum = checksum(&info, &columns);
        Ok(Self {
            info,
            annotations,
            modalities,
            columns,
            registry,
            checksum,
        })
    }

    /// Loads the value at (`row`, `column`) through the column's modality rule.
    ///
    /// # Returns
    /// The materialized value, a validation error for an unknown column or an
    /// out of range row, or a storage error if the chunk cannot be read or
    /// the value cannot be decoded.
    pub fn get_data(&self, row: usize, column: &str) -> Result<Datum> {
        let value = self.columns.get(column, row)?;
        self.registry.rule(self.modality(column)?).load(value, column, row)
    }

    /// The stored value at (`row`, `column`), without modality loading.
    pub fn get_value(&self, row: usize, column: &str) -> Result<Value> {
        self.columns.get(column, row)
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.columns.length()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.column_names()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Explicit annotations only; see [`Dataset::modality`] for every column.
    pub fn annotations(&self) -> &BTreeMap<String, Modality> {
        &self.annotations
    }

    pub fn modality(&self, column: &str) -> Result<Modality> {
        self.modalities
            .get(column)
            .copied()
            .ok_or_else(|| ValidationError::ColumnNotFound(column.to_string()).into())
    }

    pub fn column_kind(&self, column: &str) -> Result<StorageKind> {
        Ok(self.columns.column(column)?.kind())
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn source(&self) -> &str {
        &self.info.source
    }

    /// Hex SHA-256 identity over name, description, source, sorted column names
    /// and row count.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn registry(&self) -> &Arc<ModalityRegistry> {
        &self.registry
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.columns.cache().stats()
    }

    /// Drops every cached chunk.
    pub fn clear_cache(&self) {
        self.columns.cache().clear();
    }

    /// Derives a new dataset with one more in-memory column. `self` is left
    /// untouched; the new dataset has its own identity and its own chunk cache.
    pub fn with_column(&self, name: impl Into<String>, values: Vec<Value>, modality: Option<Modality>) -> Result<Self> {
        let column = Column::memory(name, values)?;
        let mut annotations = self.annotations.clone();
        if let Some(modality) = modality {
            annotations.insert(column.name().to_string(), modality);
        }

        let mut columns = self.columns.columns().to_vec();
        columns.push(column);
        let store = self.columns.store().cloned();
        Self::assemble(self.info.clone(), annotations, ColumnStore::new(columns, store)?, Arc::clone(&self.registry))
    }

    /// Writes the dataset as a new directory archive at `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        check_group_names(&self.columns)?;
        let mut store = DirectoryStore::create(path)?;
        self.to_store(&mut store)?;
        log::info!("wrote dataset `{}` to {}", self.name(), store.location());
        Ok(())
    }

    /// Writes the dataset into `store`.
    ///
    /// Scalar columns go to the `table` attribute. Array columns become
    /// groups: chunked ones keep their layout, in-memory ones are stored
    /// `whole` when every row has the same shape and `per_row` otherwise.
    /// Reading the archive back with [`Dataset::open_store`] reproduces this
    /// dataset.
    ///
    /// # Errors
    /// An `EntryName` error, before anything is written, if an array column
    /// has a name that cannot be a group (empty, starting with `.`, or holding
    /// a path separator).
    pub fn to_store<S: WritableStore>(&self, store: &mut S) -> Result<()> {
        check_group_names(&self.columns)?;
        let mut scalar_columns = Vec::new();

        for column in self.columns.columns() {
            if let Some(layout) = column.layout() {
                let chunks = self.columns.chunks(column)?;
                let metadata = match layout {
                    ChunkLayout::Whole => GroupMetadata::whole(chunks.first().map(|c| c.shape().to_vec()).unwrap_or_default()),
                    ChunkLayout::PerRow => GroupMetadata::per_row(chunks.iter().map(|c| c.shape().to_vec())),
                };
                store.write_group_metadata(column.name(), &metadata)?;
                for (i, chunk) in chunks.iter().enumerate() {
                    let name = match layout {
                        ChunkLayout::Whole => WHOLE_ARRAY_NAME.to_string(),
                        ChunkLayout::PerRow => i.to_string(),
                    };
                    store.write_array(column.name(), &name, chunk)?;
                }
            } else if column.kind() == StorageKind::Array {
                write_array_column(store, column.name(), column.values().unwrap_or_default())?;
            } else {
                let values = column.values().unwrap_or_default().to_vec();
                scalar_columns.push((column.name().to_string(), values));
            }
        }

        let attributes = RootAttributes {
            info: self.info.clone(),
            annotations: self.annotations.iter().map(|(c, m)| (c.clone(), m.tag().to_string())).collect(),
            order: Some(self.column_names().into_iter().map(String::from).collect()),
            columns: scalar_columns,
        };
        store.write_attributes(&attributes.to_map())
    }
}

/// Array columns become archive groups, so their names must be valid entries.
fn check_group_names(columns: &ColumnStore) -> Result<()> {
    columns
        .columns()
        .iter()
        .filter(|c| c.is_chunked() || c.kind() == StorageKind::Array)
        .try_for_each(|c| check_entry_name(c.name()))
}

fn write_array_column<S: WritableStore>(store: &mut S, name: &str, values: &[Value]) -> Result<()> {
    let location = store.location();
    let arrays = values
        .iter()
        .enumerate()
        .map(|(row, v)| {
            v.as_array()
                .ok_or_else(|| StorageError::format(&location, format!("column `{name}` has no array at row {row}")))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let uniform = arrays.windows(2).all(|w| w[0].shape() == w[1].shape());
    if uniform && !arrays.is_empty() {
        let views = arrays.iter().map(|a| a.view()).collect::<Vec<ArrayView<f64, IxDyn>>>();
        let whole = ndarray::stack(Axis(0), &views).map_err(|e| StorageError::format(&location, format!("column `{name}`: {e}")))?;
        store.write_group_metadata(name, &GroupMetadata::whole(whole.shape().to_vec()))?;
        store.write_array(name, WHOLE_ARRAY_NAME, &whole)
    } else {
        store.write_group_metadata(name, &GroupMetadata::per_row(arrays.iter().map(|a| a.shape().to_vec())))?;
        for (row, array) in arrays.into_iter().enumerate() {
            store.write_array(name, &row.to_string(), array)?;
        }
        Ok(())
    }
}

fn checksum(info: &DatasetInfo, columns: &ColumnStore) -> String {
    let mut names = columns.column_names();
    names.sort_unstable();
    let rows = columns.length().to_string();

    let parts = [info.name.as_str(), info.description.as_str(), info.source.as_str()]
        .into_iter()
        .chain(names)
        .chain([rows.as_str()])
        .map(str::as_bytes);
    helpers::digest(parts)
}

/// Collects the pieces of a [`Dataset`] before validating them all at once.
///
/// ```ignore
/// let dataset = Dataset::builder("freesolv")
///     .description("Hydration free energies")
///     .table(table)
///     .annotate("smiles", Modality::Molecule)
///     .build(registry)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    info: DatasetInfo,
    table: Table,
    annotations: BTreeMap<String, Modality>,
}

impl DatasetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: DatasetInfo {
                name: name.into(),
                ..DatasetInfo::default()
            },
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.info.description = description.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.info.source = source.into();
        self
    }

    pub fn table(mut self, table: Table) -> Self {
        self.table = table;
        self
    }

    pub fn annotate(mut self, column: impl Into<String>, modality: Modality) -> Self {
        self.annotations.insert(column.into(), modality);
        self
    }

    pub fn build(self, registry: Arc<ModalityRegistry>) -> Result<Dataset> {
        Dataset::new(self.table, self.info, self.annotations, registry)
    }
}

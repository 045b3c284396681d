//! The data layer: values and modalities, chunked archives, and the
//! [`Dataset`] that ties them together.

pub mod archive;
mod dataset;
mod modality;
mod table;
mod value;

pub use archive::{ArrayStore, ChunkLayout, DirectoryStore, GroupMetadata, MemoryStore, WritableStore};
pub use dataset::{CacheStats, ChunkCache, ChunkKey, Column, ColumnStore, Dataset, DatasetBuilder, DatasetInfo};
pub use modality::{Datum, Decoder, Image, Modality, ModalityRegistry, ModalityRule, Molecule};
pub use table::Table;
pub use value::{StorageKind, Value};

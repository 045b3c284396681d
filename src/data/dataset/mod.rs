mod cache;
mod column;
#[allow(clippy::module_inception)]
mod dataset;
mod tests;

pub use cache::{CacheStats, ChunkCache, ChunkKey};
pub use column::{Column, ColumnStore};
pub use dataset::{Dataset, DatasetBuilder, DatasetInfo};

//! Hard-coded constants for the archive layout and split handling.

/// Root attribute file of a directory archive.
pub const ATTRIBUTES_FILENAME: &str = ".attrs.json";

/// Per-group metadata file listing the arrays in the group and their shapes.
pub const GROUP_METADATA_FILENAME: &str = ".group.json";

/// Extension of array chunks in a directory archive.
pub const ARRAY_EXTENSION: &str = "npy";

/// The single array of a group stored with the `whole` layout.
pub const WHOLE_ARRAY_NAME: &str = "data";

/// Root attribute keys every archive must carry.
pub const NAME_KEY: &str = "name";
pub const DESCRIPTION_KEY: &str = "description";
pub const SOURCE_KEY: &str = "source";
pub const ANNOTATIONS_KEY: &str = "annotations";

/// Root attribute holding the in-memory scalar columns, each as
/// `{"kind": .., "rows": {row index: value}}`.
pub const TABLE_KEY: &str = "table";

/// Optional root attribute holding the column order.
pub const COLUMN_ORDER_KEY: &str = "columns";

/// Name given to the test set of a flat split.
pub const DEFAULT_TEST_SET: &str = "test";

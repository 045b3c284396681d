use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::constants::{
    ANNOTATIONS_KEY, COLUMN_ORDER_KEY, DESCRIPTION_KEY, NAME_KEY, SOURCE_KEY, TABLE_KEY, WHOLE_ARRAY_NAME,
};
use crate::data::{DatasetInfo, StorageKind, Value};

const KIND_KEY: &str = "kind";
const ROWS_KEY: &str = "rows";
use crate::error::{Result, StorageError};

/// How a group splits its column into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkLayout {
    /// One array named `data`; its first axis runs over rows.
    Whole,
    /// One array per row, named by the row index.
    PerRow,
}

/// The arrays a group holds and their shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub layout: ChunkLayout,
    pub arrays: BTreeMap<String, Vec<usize>>,
}

impl GroupMetadata {
    pub fn whole(shape: Vec<usize>) -> Self {
        Self {
            layout: ChunkLayout::Whole,
            arrays: [(WHOLE_ARRAY_NAME.to_string(), shape)].into_iter().collect(),
        }
    }

    pub fn per_row(shapes: impl IntoIterator<Item = Vec<usize>>) -> Self {
        Self {
            layout: ChunkLayout::PerRow,
            arrays: shapes
                .into_iter()
                .enumerate()
                .map(|(i, shape)| (i.to_string(), shape))
                .collect(),
        }
    }

    /// Number of rows the group covers.
    ///
    /// # Errors
    /// A description of the problem if the arrays do not fit the layout: a
    /// whole group needs a single `data` array with at least one axis, a
    /// per-row group needs arrays named `0..n` with nothing missing.
    pub fn rows(&self) -> std::result::Result<usize, String> {
        match self.layout {
            ChunkLayout::Whole => {
                let shape = self
                    .arrays
                    .get(WHOLE_ARRAY_NAME)
                    .ok_or_else(|| format!("no `{WHOLE_ARRAY_NAME}` array in a whole group"))?;
                if self.arrays.len() != 1 {
                    return Err(format!("whole group holds {} arrays", self.arrays.len()));
                }
                shape
                    .first()
                    .copied()
                    .ok_or_else(|| format!("`{WHOLE_ARRAY_NAME}` is zero-dimensional"))
            }
            ChunkLayout::PerRow => {
                let n = self.arrays.len();
                match (0..n).find(|i| !self.arrays.contains_key(&i.to_string())) {
                    Some(missing) => Err(format!("per-row group of {n} arrays has no array `{missing}`")),
                    None => Ok(n),
                }
            }
        }
    }
}

/// The parsed root attribute block of an archive.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RootAttributes {
    pub info: DatasetInfo,
    pub annotations: BTreeMap<String, String>,
    pub order: Option<Vec<String>>,
    /// In-memory columns, stored as `{row index: value}` objects.
    pub columns: Vec<(String, Vec<Value>)>,
}

impl RootAttributes {
    pub fn parse(location: &str, mut attributes: Map<String, JsonValue>) -> Result<Self> {
        let mut required_str = |key: &str| -> Result<String> {
            match attributes.remove(key) {
                Some(JsonValue::String(s)) => Ok(s),
                Some(other) => Err(StorageError::format(location, format!("attribute `{key}` is not a string: {other}")).into()),
                None => Err(StorageError::format(location, format!("missing attribute `{key}`")).into()),
            }
        };
        let info = DatasetInfo {
            name: required_str(NAME_KEY)?,
            description: required_str(DESCRIPTION_KEY)?,
            source: required_str(SOURCE_KEY)?,
        };

        let annotations = match attributes.remove(ANNOTATIONS_KEY) {
            Some(JsonValue::Object(map)) => map
                .into_iter()
                .map(|(column, tag)| match tag {
                    JsonValue::String(tag) => Ok((column, tag)),
                    other => Err(StorageError::format(
                        location,
                        format!("annotation of `{column}` is not a string: {other}"),
                    )
                    .into()),
                })
                .collect::<Result<BTreeMap<_, _>>>()?,
            Some(other) => {
                return Err(StorageError::format(location, format!("attribute `{ANNOTATIONS_KEY}` is not an object: {other}")).into())
            }
            None => return Err(StorageError::format(location, format!("missing attribute `{ANNOTATIONS_KEY}`")).into()),
        };

        let order = match attributes.remove(COLUMN_ORDER_KEY) {
            None => None,
            Some(JsonValue::Array(names)) => Some(
                names
                    .into_iter()
                    .map(|n| match n {
                        JsonValue::String(s) => Ok(s),
                        other => Err(StorageError::format(location, format!("column name {other} is not a string")).into()),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(StorageError::format(location, format!("attribute `{COLUMN_ORDER_KEY}` is not a list: {other}")).into())
            }
        };

        let mut columns = Vec::new();
        match attributes.remove(TABLE_KEY) {
            None => (),
            Some(JsonValue::Object(table)) => {
                for (name, entry) in table {
                    let values = parse_table_column(location, &name, entry)?;
                    columns.push((name, values));
                }
            }
            Some(other) => {
                return Err(StorageError::format(location, format!("attribute `{TABLE_KEY}` is not an object: {other}")).into())
            }
        }

        // Older archives keep scalar columns as root objects.
        for (key, value) in attributes {
            match value {
                JsonValue::Object(cells) => {
                    if columns.iter().any(|(name, _)| *name == key) {
                        return Err(StorageError::format(
                            location,
                            format!("column `{key}` is stored both in `{TABLE_KEY}` and at the root"),
                        )
                        .into());
                    }
                    let values = parse_cells(location, &key, cells, None)?;
                    columns.push((key, values));
                }
                other => log::warn!("{location}: ignoring attribute `{key}` = {other}"),
            }
        }

        Ok(Self {
            info,
            annotations,
            order,
            columns,
        })
    }

    pub fn to_map(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert(NAME_KEY.to_string(), self.info.name.clone().into());
        map.insert(DESCRIPTION_KEY.to_string(), self.info.description.clone().into());
        map.insert(SOURCE_KEY.to_string(), self.info.source.clone().into());
        map.insert(
            ANNOTATIONS_KEY.to_string(),
            JsonValue::Object(
                self.annotations
                    .iter()
                    .map(|(c, t)| (c.clone(), JsonValue::String(t.clone())))
                    .collect(),
            ),
        );
        if let Some(order) = &self.order {
            map.insert(COLUMN_ORDER_KEY.to_string(), order.clone().into());
        }
        let table = self
            .columns
            .iter()
            .map(|(name, values)| {
                let mut entry = Map::new();
                if let Some(kind) = common_kind(values) {
                    entry.insert(KIND_KEY.to_string(), JsonValue::String(kind.to_string()));
                }
                let cells = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.to_json().unwrap_or(JsonValue::Null)))
                    .collect();
                entry.insert(ROWS_KEY.to_string(), JsonValue::Object(cells));
                (name.clone(), JsonValue::Object(entry))
            })
            .collect();
        map.insert(TABLE_KEY.to_string(), JsonValue::Object(table));
        map
    }
}

fn common_kind(values: &[Value]) -> Option<StorageKind> {
    let mut kinds = values.iter().filter_map(Value::kind);
    let first = kinds.next()?;
    kinds.try_fold(first, StorageKind::unify)
}

fn parse_table_column(location: &str, name: &str, entry: JsonValue) -> Result<Vec<Value>> {
    let mut entry = match entry {
        JsonValue::Object(entry) => entry,
        other => return Err(StorageError::format(location, format!("column `{name}` is not an object: {other}")).into()),
    };
    let kind = match entry.remove(KIND_KEY) {
        None | Some(JsonValue::Null) => None,
        Some(kind) => Some(
            serde_json::from_value::<StorageKind>(kind)
                .map_err(|e| StorageError::format(location, format!("column `{name}` has a bad kind: {e}")))?,
        ),
    };
    match entry.remove(ROWS_KEY) {
        Some(JsonValue::Object(cells)) => parse_cells(location, name, cells, kind),
        _ => Err(StorageError::format(location, format!("column `{name}` has no `{ROWS_KEY}` object")).into()),
    }
}

fn parse_cells(location: &str, name: &str, cells: Map<String, JsonValue>, kind: Option<StorageKind>) -> Result<Vec<Value>> {
    let mut rows = cells
        .iter()
        .map(|(k, v)| {
            k.parse::<usize>()
                .map(|i| (i, Value::from_json_as(v, kind)))
                .map_err(|_| StorageError::format(location, format!("column `{name}` has non-integer row key `{k}`")))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.sort_by_key(|&(i, _)| i);

    if let Some((i, _)) = rows.iter().enumerate().find(|&(expected, (i, _))| expected != *i) {
        return Err(StorageError::format(location, format!("column `{name}` has no value for row {i}")).into());
    }
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attributes() -> Map<String, JsonValue> {
        match json!({
            "name": "Test",
            "description": "Go wild in your test cases",
            "source": "Imagination",
            "annotations": {"A": "MOLECULE_3D", "B": "IMAGE"},
            "C": {"0": 0.0, "1": 0.5, "2": 1.0},
            "version": 2,
        }) {
            JsonValue::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_root() {
        let attrs = RootAttributes::parse("mem://", attributes()).unwrap();
        assert_eq!(attrs.info.name, "Test");
        assert_eq!(attrs.info.source, "Imagination");
        assert_eq!(attrs.annotations["A"], "MOLECULE_3D");
        assert_eq!(attrs.order, None);
        assert_eq!(
            attrs.columns,
            vec![("C".to_string(), vec![Value::Float(0.), Value::Float(0.5), Value::Float(1.)])]
        );

        let again = RootAttributes::parse("mem://", attrs.to_map()).unwrap();
        assert_eq!(again, attrs);
    }

    #[test]
    fn missing_required_attribute() {
        for key in [NAME_KEY, DESCRIPTION_KEY, SOURCE_KEY, ANNOTATIONS_KEY] {
            let mut map = attributes();
            map.remove(key);
            let err = RootAttributes::parse("mem://", map).unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
    }

    #[test]
    fn column_with_a_hole() {
        let mut map = attributes();
        map.insert("D".into(), json!({"0": 1, "2": 3}));
        let err = RootAttributes::parse("mem://", map).unwrap_err();
        assert!(err.to_string().contains("row 1"), "{err}");
    }

    #[test]
    fn scalar_columns_live_under_the_table() {
        let attrs = RootAttributes {
            info: DatasetInfo::new("Test", "", "Imagination"),
            annotations: BTreeMap::new(),
            order: None,
            columns: [NAME_KEY, SOURCE_KEY, ANNOTATIONS_KEY, COLUMN_ORDER_KEY, TABLE_KEY]
                .into_iter()
                .map(|name| (name.to_string(), vec![Value::Text(format!("{name}_a")), Value::Null]))
                .collect(),
        };
        let map = attrs.to_map();
        assert_eq!(map[SOURCE_KEY], "Imagination");
        assert_eq!(map[TABLE_KEY][SOURCE_KEY]["kind"], "text");
        assert_eq!(map[TABLE_KEY][SOURCE_KEY]["rows"]["0"], "source_a");

        let mut again = RootAttributes::parse("mem://", map).unwrap();
        again.columns.sort_by(|a, b| a.0.cmp(&b.0));
        let mut expected = attrs.columns.clone();
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(again.info, attrs.info);
        assert_eq!(again.columns, expected);
    }

    #[test]
    fn non_finite_floats_round_trip() {
        let values = vec![Value::Float(f64::INFINITY), Value::Float(f64::NEG_INFINITY), Value::Int(3), Value::Null];
        let attrs = RootAttributes {
            info: DatasetInfo::new("Test", "", ""),
            annotations: BTreeMap::new(),
            order: None,
            columns: vec![
                ("dG".to_string(), values.clone()),
                ("nan".to_string(), vec![Value::Float(f64::NAN)]),
                ("words".to_string(), vec![Value::Text("Infinity".into())]),
            ],
        };

        let again = RootAttributes::parse("mem://", attrs.to_map()).unwrap();
        assert_eq!(again.columns[0], ("dG".to_string(), values));
        assert!(matches!(again.columns[1].1[..], [Value::Float(v)] if v.is_nan()));
        assert_eq!(again.columns[2].1, vec![Value::Text("Infinity".into())]);
    }

    #[test]
    fn malformed_table() {
        for table in [json!([1, 2]), json!({"D": 3}), json!({"D": {"kind": "float"}}), json!({"D": {"kind": "complex", "rows": {}}})] {
            let mut map = attributes();
            map.insert(TABLE_KEY.into(), table.clone());
            let err = RootAttributes::parse("mem://", map).unwrap_err();
            assert!(matches!(err, crate::Error::Storage(StorageError::ArchiveFormat { .. })), "{table}: {err}");
        }

        let mut map = attributes();
        map.insert(TABLE_KEY.into(), json!({"C": {"rows": {"0": 1.0}}}));
        let err = RootAttributes::parse("mem://", map).unwrap_err();
        assert!(err.to_string().contains("both"), "{err}");
    }

    #[test]
    fn group_rows() {
        assert_eq!(GroupMetadata::whole(vec![100, 2048]).rows(), Ok(100));
        assert_eq!(GroupMetadata::per_row(vec![vec![3]; 7]).rows(), Ok(7));
        assert!(GroupMetadata::whole(vec![]).rows().is_err());

        let mut gapped = GroupMetadata::per_row(vec![vec![3]; 3]);
        gapped.arrays.remove("1");
        assert!(gapped.rows().is_err());
    }
}

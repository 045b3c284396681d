use std::io::Read;
use std::path::Path;

use super::value::Value;
use crate::error::{Result, StorageError, ValidationError};

/// An in-memory table with named columns and a fixed row count, consumed when
/// a `Dataset` is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column; the first column fixes the row count.
    pub fn with_column<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        self.push_column(name, values.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(ValidationError::DuplicateColumn(name).into());
        }
        if !self.columns.is_empty() && values.len() != self.num_rows() {
            return Err(ValidationError::ColumnLength {
                column: name,
                expected: self.num_rows(),
                found: values.len(),
            }
            .into());
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Reads a CSV file with a header row. Cells are typed one by one: ints,
    /// floats and booleans are recognized, empty cells are nulls and anything
    /// else is text.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| StorageError::io(path, e))?;
        let table = Self::from_csv_reader(file)?;
        log::debug!(
            "read {} rows x {} columns from {}",
            table.num_rows(),
            table.num_columns(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let names = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();

        let mut columns = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record?;
            for (column, cell) in columns.iter_mut().zip(record.iter()) {
                column.push(Value::guess(cell));
            }
        }

        let mut table = Self::new();
        for (name, values) in names.into_iter().zip(columns) {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn num_columns(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub(crate) fn into_columns(self) -> impl Iterator<Item = (String, Vec<Value>)> {
        self.names.into_iter().zip(self.columns)
    }
}

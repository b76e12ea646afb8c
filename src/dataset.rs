//! Tabular data model: ordered named columns over ordered rows of untyped
//! text cells.
//!
//! Cells are plain strings; an empty string is a missing value. Tables loaded
//! from disk become "original snapshots" — every transformation (filtering,
//! pivoting, derived columns) returns a new [`Table`] and never mutates its
//! input, so repeated recomputation passes can safely share the originals.

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from headers and rows, padding or truncating each row
    /// to the header width so ragged input cannot misalign columns.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    /// Index of an exactly-named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell content at (row, column); `None` when out of range or empty.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        let value = self.rows.get(row)?.get(column)?;
        if value.is_empty() { None } else { Some(value) }
    }

    /// All present (non-missing) values of one column, in row order.
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(column))
            .filter(|v| !v.is_empty())
            .map(String::as_str)
    }

    /// New table keeping the rows whose index satisfies the predicate.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(idx, _)| keep(*idx))
            .map(|(_, row)| row.clone())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// New table with one extra column appended; `values` shorter than the
    /// row count are padded with missing cells.
    pub fn with_column(&self, name: &str, mut values: Vec<String>) -> Table {
        values.resize(self.rows.len(), String::new());
        let mut columns = self.columns.clone();
        columns.push(name.to_string());
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(row, value)| {
                let mut row = row.clone();
                row.push(value);
                row
            })
            .collect();
        Table { columns, rows }
    }
}

/// The three original snapshots the reconciliation engine operates on.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub enrollments: Table,
    pub evaluations: Table,
    pub students: Table,
}

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GcisError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Ordered rows over an ordered set of columns. Cells are JSON values so that
/// API results keep their native types; rows loaded from CSV hold strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from JSON objects. Columns appear in first-seen order;
    /// keys missing from an object become `Null`.
    pub fn from_records(records: Vec<Map<String, Value>>) -> Self {
        let mut table = Table::default();
        for record in records {
            table.push_record(record);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    /// Appends a row; short rows are padded with `Null`, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn push_record(&mut self, record: Map<String, Value>) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (key, value) in record {
            match self.column_index(&key) {
                Some(index) => row[index] = value,
                None => {
                    self.add_column(key);
                    row.push(value);
                }
            }
        }
        self.rows.push(row);
    }

    fn add_column(&mut self, name: String) {
        self.columns.push(name);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
    }

    /// Sets `name` to `value` on every row and moves the column to `position`.
    pub fn insert_column(&mut self, position: usize, name: &str, value: Value) {
        if let Some(existing) = self.column_index(name) {
            self.columns.remove(existing);
            for row in &mut self.rows {
                row.remove(existing);
            }
        }
        let position = position.min(self.columns.len());
        self.columns.insert(position, name.to_string());
        for row in &mut self.rows {
            row.insert(position, value.clone());
        }
    }

    /// Appends `other` below `self`, taking the union of both column sets.
    pub fn append(&mut self, other: Table) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }
        let mapping = other
            .columns
            .iter()
            .map(|column| match self.column_index(column) {
                Some(index) => index,
                None => {
                    self.add_column(column.clone());
                    self.columns.len() - 1
                }
            })
            .collect::<Vec<_>>();
        for cells in other.rows {
            let mut row = vec![Value::Null; self.columns.len()];
            for (cell, &index) in cells.into_iter().zip(&mapping) {
                row[index] = cell;
            }
            self.rows.push(row);
        }
    }

    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        let mut result = Table::default();
        for table in tables {
            result.append(table);
        }
        result
    }

    /// Keeps the rows for which `keep` returns true, in order.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Value]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Drops repeated rows, keeping the first occurrence.
    pub fn dedup_rows(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row_key(row)));
    }

    /// Rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<_, _>>()
            })
            .collect()
    }

    /// CSV encoded as UTF-8 with a byte-order mark. With `index`, a leading
    /// unnamed column numbers the rows from zero.
    pub fn to_csv_bytes(&self, index: bool) -> Result<Vec<u8>, GcisError> {
        let mut writer = csv::WriterBuilder::new().from_writer(UTF8_BOM.to_vec());

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        if index {
            header.push(String::new());
        }
        header.extend(self.columns.iter().cloned());
        writer
            .write_record(&header)
            .map_err(|err| GcisError::Csv(err.to_string()))?;

        for (position, row) in self.rows.iter().enumerate() {
            let mut record = Vec::with_capacity(row.len() + 1);
            if index {
                record.push(position.to_string());
            }
            record.extend(row.iter().map(cell_text));
            writer
                .write_record(&record)
                .map_err(|err| GcisError::Csv(err.to_string()))?;
        }

        writer
            .into_inner()
            .map_err(|err| GcisError::Csv(err.to_string()))
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.columns.hash(&mut hasher);
        for row in &self.rows {
            row_key(row).hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn row_key(row: &[Value]) -> String {
    serde_json::to_string(row).unwrap_or_default()
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Memoizes CSV exports by table content.
#[derive(Default)]
pub struct CsvExportCache {
    entries: Mutex<HashMap<(u64, bool), Vec<(Table, Arc<[u8]>)>>>,
}

impl CsvExportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_export(&self, table: &Table, index: bool) -> Result<Arc<[u8]>, GcisError> {
        let key = (table.content_hash(), index);
        if let Ok(entries) = self.entries.lock() {
            if let Some((_, bytes)) = entries
                .get(&key)
                .and_then(|bucket| bucket.iter().find(|(cached, _)| cached == table))
            {
                return Ok(bytes.clone());
            }
        }

        let bytes: Arc<[u8]> = table.to_csv_bytes(index)?.into();
        if let Ok(mut entries) = self.entries.lock() {
            entries
                .entry(key)
                .or_default()
                .push((table.clone(), bytes.clone()));
        }
        Ok(bytes)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// src/normalize.rs

use crate::error::ValidationError;
use crate::schema::TableSchema;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One unprocessed worksheet row, header included.
pub type RawRow = Vec<String>;

/// A schema-mapped row ready for writing. `values[i]` belongs to `schema.columns()[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<String>,
}

impl Record {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    /// Value for `column`, if the schema declares it.
    pub fn get<'a>(&'a self, schema: &TableSchema, column: &str) -> Option<&'a str> {
        schema
            .position(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Unique-key tuple in the schema's declared key order, or `None` when
    /// the record is too narrow for `schema`.
    pub fn key(&self, schema: &TableSchema) -> Option<Vec<&str>> {
        schema
            .key_positions()
            .iter()
            .map(|&i| self.values.get(i).map(String::as_str))
            .collect()
    }
}

/// Map worksheet rows onto `schema` and drop later duplicates of a unique key.
///
/// The first row is the header and is always skipped. A row with fewer cells
/// than the schema has columns is rejected; extra cells are ignored. For a
/// repeated key the first occurrence in row order is kept.
pub fn normalize(rows: &[RawRow], schema: &TableSchema) -> Result<Vec<Record>, ValidationError> {
    let width = schema.columns().len();
    let mut seen: HashSet<Vec<&str>> = HashSet::new();
    let mut records = Vec::with_capacity(rows.len().saturating_sub(1));
    let mut dropped = 0usize;

    for (idx, row) in rows.iter().enumerate().skip(1) {
        if row.len() < width {
            return Err(ValidationError::ShortRow {
                row: idx + 1,
                expected: width,
                found: row.len(),
            });
        }

        let key: Vec<&str> = schema
            .key_positions()
            .iter()
            .map(|&i| row[i].as_str())
            .collect();
        if !seen.insert(key) {
            dropped += 1;
            debug!(table = schema.table(), row = idx + 1, "duplicate key, dropping row");
            continue;
        }

        records.push(Record::new(row[..width].to_vec()));
    }

    if dropped > 0 {
        warn!(
            table = schema.table(),
            dropped, "dropped rows with an already-seen unique key"
        );
    }

    Ok(records)
}

// src/schema.rs

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern should compile")
});

pub const EMPLOYEE_COLUMNS: &[&str] = &[
    "name",
    "email",
    "vsa_uspr_access",
    "vsa_pe_access",
    "vsa_noc_access",
    "vsa_dci_access",
    "vsa_sc_access",
];
pub const EMPLOYEE_KEY: &[&str] = &["email"];

pub const APPLICATION_COLUMNS: &[&str] = &[
    "name", "owner", "vsa_type", "vsa_uspr", "vsa_pe", "vsa_noc", "vsa_dci", "vsa_sc",
];
pub const APPLICATION_KEY: &[&str] = &["name"];

/// Destination table layout: ordered columns plus the conflict target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: String,
    columns: Vec<String>,
    unique_key: Vec<String>,
    key_positions: Vec<usize>,
}

impl TableSchema {
    /// Validate and build a schema. The unique key must be a non-empty subset of `columns`.
    pub fn new(
        table: impl Into<String>,
        columns: &[&str],
        unique_key: &[&str],
    ) -> Result<Self, ValidationError> {
        let table = table.into();
        let invalid = |message: String| ValidationError::Schema {
            table: table.clone(),
            message,
        };

        if !IDENTIFIER.is_match(&table) {
            return Err(invalid("table name is not a valid identifier".into()));
        }
        if columns.is_empty() {
            return Err(invalid("no columns declared".into()));
        }
        let mut seen = HashSet::new();
        for col in columns {
            if !IDENTIFIER.is_match(col) || col.contains('.') {
                return Err(invalid(format!("column `{}` is not a valid identifier", col)));
            }
            if !seen.insert(*col) {
                return Err(invalid(format!("column `{}` declared twice", col)));
            }
        }
        if unique_key.is_empty() {
            return Err(invalid("unique key is empty".into()));
        }

        let mut key_positions = Vec::with_capacity(unique_key.len());
        for key in unique_key {
            let pos = columns
                .iter()
                .position(|c| c == key)
                .ok_or_else(|| invalid(format!("unique key `{}` is not a column", key)))?;
            if key_positions.contains(&pos) {
                return Err(invalid(format!("unique key `{}` listed twice", key)));
            }
            key_positions.push(pos);
        }

        Ok(Self {
            table,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique_key: unique_key.iter().map(|c| c.to_string()).collect(),
            key_positions,
        })
    }

    /// Employee access attributes, keyed by `email`.
    pub fn employee(table: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(table, EMPLOYEE_COLUMNS, EMPLOYEE_KEY)
    }

    /// Application classifications, keyed by `name`.
    pub fn application(table: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(table, APPLICATION_COLUMNS, APPLICATION_KEY)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn unique_key(&self) -> &[String] {
        &self.unique_key
    }

    /// Positions of the key columns, in declared key order.
    pub fn key_positions(&self) -> &[usize] {
        &self.key_positions
    }

    /// Columns overwritten on conflict, in declared order.
    pub fn update_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.key_positions.contains(i))
            .map(|(_, c)| c.as_str())
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_are_valid() {
        let emp = TableSchema::employee("employee_vsa_attributes").unwrap();
        assert_eq!(emp.columns().len(), 7);
        assert_eq!(emp.key_positions(), &[1]);
        assert!(!emp.update_columns().any(|c| c == "email"));

        let app = TableSchema::application("vsa_app_classifications").unwrap();
        assert_eq!(app.columns().len(), 8);
        assert_eq!(app.key_positions(), &[0]);
        assert_eq!(app.update_columns().count(), 7);
    }

    #[test]
    fn key_must_be_a_column() {
        let err = TableSchema::new("t", &["a", "b"], &["c"]).unwrap_err();
        assert!(err.to_string().contains("unique key `c` is not a column"));
    }

    #[test]
    fn rejects_empty_key_and_duplicates() {
        assert!(TableSchema::new("t", &["a"], &[]).is_err());
        assert!(TableSchema::new("t", &["a", "a"], &["a"]).is_err());
        assert!(TableSchema::new("t", &["a", "b"], &["a", "a"]).is_err());
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(TableSchema::new("drop table;", &["a"], &["a"]).is_err());
        assert!(TableSchema::new("t", &["a b"], &["a b"]).is_err());
        assert!(TableSchema::new("public.t", &["a"], &["a"]).is_ok());
    }

    #[test]
    fn composite_key_keeps_declared_order() {
        let s = TableSchema::new("t", &["a", "b", "c"], &["c", "a"]).unwrap();
        assert_eq!(s.key_positions(), &[2, 0]);
        assert_eq!(s.update_columns().collect::<Vec<_>>(), vec!["b"]);
    }
}

//! Read-only access to spreadsheet worksheets.

pub mod auth;
pub mod client;

use crate::error::ReadError;
use crate::normalize::RawRow;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use url::Url;

pub use auth::SheetCredentials;
pub use client::SheetsClient;

const DOC_HOST: &str = "docs.google.com";

static DOC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").expect("document id pattern should compile"));

/// Spreadsheet document id, extracted from a sharing URL or given bare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLocator {
    id: String,
}

impl SheetLocator {
    /// Accepts `https://docs.google.com/spreadsheets/d/<id>/...` or a bare id.
    pub fn parse(raw: &str) -> Result<Self, ReadError> {
        let raw = raw.trim();
        let invalid = || ReadError::InvalidLocator(raw.to_string());

        let id = match Url::parse(raw) {
            Ok(url) => {
                if url.host_str() != Some(DOC_HOST) {
                    return Err(invalid());
                }
                let mut segments = url.path_segments().ok_or_else(invalid)?;
                match (segments.next(), segments.next(), segments.next()) {
                    (Some("spreadsheets"), Some("d"), Some(id)) => id.to_string(),
                    _ => return Err(invalid()),
                }
            }
            Err(_) => raw.to_string(),
        };

        if DOC_ID.is_match(&id) {
            Ok(Self { id })
        } else {
            Err(invalid())
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SheetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Source of worksheet rows. The first returned row is the header.
#[async_trait]
pub trait SheetReader: Send + Sync {
    async fn read(&self, document: &SheetLocator, worksheet: &str) -> Result<Vec<RawRow>, ReadError>;
}

/// Drop trailing rows with no content. Rows stay ragged so a short row is
/// still visible to validation.
pub fn tidy_rows(mut rows: Vec<RawRow>) -> Vec<RawRow> {
    while rows
        .last()
        .map_or(false, |r| r.iter().all(|c| c.is_empty()))
    {
        rows.pop();
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::normalize::normalize;
    use crate::schema::TableSchema;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn locator_from_url_or_id() {
        let url = "https://docs.google.com/spreadsheets/d/19vvQgQkJg0y7g_P6L4yENgOnO-vAHDsg7dOX556ZXJM/edit?usp=sharing";
        assert_eq!(
            SheetLocator::parse(url).unwrap().id(),
            "19vvQgQkJg0y7g_P6L4yENgOnO-vAHDsg7dOX556ZXJM"
        );
        assert_eq!(
            SheetLocator::parse("1lAWbVaBkee1ruKvIdIly33hRLlVv4b_HlexzXu1l2kI")
                .unwrap()
                .id(),
            "1lAWbVaBkee1ruKvIdIly33hRLlVv4b_HlexzXu1l2kI"
        );
        assert!(matches!(
            SheetLocator::parse("https://example.com/nope"),
            Err(ReadError::InvalidLocator(_))
        ));
    }

    #[test]
    fn locator_requires_the_sheets_host() {
        for raw in [
            "https://example.com/x/spreadsheets/d/abcdefghijkl",
            "https://docs.google.com/document/d/abcdefghijkl/edit",
            "https://docs.google.com/spreadsheets/d/",
            "docs.google.com/spreadsheets/d/abcdefghijkl",
        ] {
            assert!(
                matches!(SheetLocator::parse(raw), Err(ReadError::InvalidLocator(_))),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn trailing_empty_rows_are_dropped() {
        let rows = vec![
            row(&["name", "email"]),
            row(&[]),
            row(&["Alice", "a@x.com"]),
            row(&["", ""]),
            row(&[]),
        ];
        let out = tidy_rows(rows);
        assert_eq!(out.len(), 3);
        // interior rows are left as returned
        assert_eq!(out[1], row(&[]));
        assert_eq!(out[2], row(&["Alice", "a@x.com"]));
        assert!(tidy_rows(vec![row(&[]), row(&[""])]).is_empty());
    }

    fn employee_header() -> RawRow {
        row(&["name", "email", "uspr", "pe", "noc", "dci", "sc"])
    }

    #[test]
    fn short_row_survives_tidying_and_fails_validation() {
        let schema = TableSchema::employee("employee_vsa_attributes").unwrap();
        let rows = tidy_rows(vec![
            employee_header(),
            row(&["Carol", "c@x.com", "Y"]),
            row(&[]),
            row(&["Bob", "b@x.com", "N", "Y", "N", "N", "N"]),
        ]);
        match normalize(&rows, &schema) {
            Err(ValidationError::ShortRow { row, expected, found }) => {
                assert_eq!((row, expected, found), (2, 7, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn interior_blank_row_is_not_written_as_a_record() {
        let schema = TableSchema::employee("employee_vsa_attributes").unwrap();
        let rows = tidy_rows(vec![
            employee_header(),
            row(&["Bob", "b@x.com", "N", "Y", "N", "N", "N"]),
            row(&[]),
            row(&["Dan", "d@x.com", "N", "N", "N", "N", "N"]),
            row(&[]),
        ]);
        assert!(matches!(
            normalize(&rows, &schema),
            Err(ValidationError::ShortRow { row: 3, found: 0, .. })
        ));

        let clean = tidy_rows(vec![
            employee_header(),
            row(&["Bob", "b@x.com", "N", "Y", "N", "N", "N"]),
            row(&["", ""]),
        ]);
        assert_eq!(normalize(&clean, &schema).unwrap().len(), 1);
    }
}

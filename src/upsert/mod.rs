//! Insert-or-update writes into destination tables.
//!
//! One generic routine serves every dataset: the statement is derived from a
//! [`TableSchema`], keyed on its unique columns, and overwrites every other
//! column on conflict.

pub mod postgres;

use crate::error::WriteError;
use crate::normalize::Record;
use crate::schema::TableSchema;
use async_trait::async_trait;
use std::fmt::Write as _;

pub use postgres::{DbConfig, PgWriter};

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Destination that applies a batch of records atomically.
#[async_trait]
pub trait TableWriter: Send + Sync {
    /// Upsert every record or none of them. Returns the number of records sent.
    async fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<u64, WriteError>;
}

/// Rows per statement so one statement stays under the bind-parameter limit.
pub fn rows_per_statement(schema: &TableSchema) -> usize {
    (MAX_BIND_PARAMS / schema.columns().len()).max(1)
}

/// Double-quote an identifier, quoting each part of `schema.table` separately.
pub fn quote_identifier(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Multi-row `INSERT … ON CONFLICT (key) DO UPDATE SET col = EXCLUDED.col, …`
/// with `$n` placeholders for `rows` records.
pub fn upsert_statement(schema: &TableSchema, rows: usize) -> String {
    let columns = schema.columns();
    let col_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(schema.table()),
        col_list
    );

    let mut param = 0usize;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns.len() {
            if col > 0 {
                sql.push_str(", ");
            }
            param += 1;
            let _ = write!(sql, "${}", param);
        }
        sql.push(')');
    }

    let conflict = schema
        .unique_key()
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = schema
        .update_columns()
        .map(|c| {
            let q = quote_identifier(c);
            format!("{} = EXCLUDED.{}", q, q)
        })
        .collect::<Vec<_>>();

    if updates.is_empty() {
        let _ = write!(sql, " ON CONFLICT ({}) DO NOTHING", conflict);
    } else {
        let _ = write!(
            sql,
            " ON CONFLICT ({}) DO UPDATE SET {}",
            conflict,
            updates.join(", ")
        );
    }
    sql
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory destination with the same all-or-nothing contract.

    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    pub(crate) type Table = BTreeMap<Vec<String>, Vec<String>>;

    #[derive(Default)]
    pub(crate) struct MemoryWriter {
        pub(crate) tables: Mutex<HashMap<String, Table>>,
        /// A record whose key tuple starts with this value aborts the batch.
        pub(crate) poison_key: Option<String>,
    }

    impl MemoryWriter {
        pub(crate) fn table(&self, name: &str) -> Table {
            self.tables
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default()
        }

        pub(crate) fn seed(&self, name: &str, rows: Table) {
            self.tables.lock().unwrap().insert(name.to_string(), rows);
        }
    }

    #[async_trait]
    impl TableWriter for MemoryWriter {
        async fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<u64, WriteError> {
            let mut tables = self.tables.lock().unwrap();
            let mut staged = tables.get(schema.table()).cloned().unwrap_or_default();

            for record in records {
                let key: Vec<String> = match record.key(schema) {
                    Some(k) => k.into_iter().map(String::from).collect(),
                    None => {
                        return Err(WriteError::Statement {
                            table: schema.table().to_string(),
                            message: "record is narrower than the table".into(),
                        });
                    }
                };
                if self.poison_key.as_deref() == key.first().map(String::as_str) {
                    return Err(WriteError::Constraint {
                        table: schema.table().to_string(),
                        message: "check constraint violated".into(),
                    });
                }
                staged.insert(key, record.values().to_vec());
            }

            tables.insert(schema.table().to_string(), staged);
            Ok(records.len() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryWriter;
    use super::*;

    fn rec(vals: &[&str]) -> Record {
        Record::new(vals.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn statement_for_application_schema() {
        let schema = TableSchema::application("vsa_app_classifications").unwrap();
        let sql = upsert_statement(&schema, 2);
        assert_eq!(
            sql,
            "INSERT INTO \"vsa_app_classifications\" (\"name\", \"owner\", \"vsa_type\", \"vsa_uspr\", \"vsa_pe\", \"vsa_noc\", \"vsa_dci\", \"vsa_sc\") \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8), ($9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (\"name\") DO UPDATE SET \"owner\" = EXCLUDED.\"owner\", \"vsa_type\" = EXCLUDED.\"vsa_type\", \
             \"vsa_uspr\" = EXCLUDED.\"vsa_uspr\", \"vsa_pe\" = EXCLUDED.\"vsa_pe\", \"vsa_noc\" = EXCLUDED.\"vsa_noc\", \
             \"vsa_dci\" = EXCLUDED.\"vsa_dci\", \"vsa_sc\" = EXCLUDED.\"vsa_sc\""
        );
    }

    #[test]
    fn key_only_schema_does_nothing_on_conflict() {
        let schema = TableSchema::new("public.tags", &["tag"], &["tag"]).unwrap();
        assert_eq!(
            upsert_statement(&schema, 1),
            "INSERT INTO \"public\".\"tags\" (\"tag\") VALUES ($1) ON CONFLICT (\"tag\") DO NOTHING"
        );
    }

    #[test]
    fn chunking_respects_parameter_limit() {
        let emp = TableSchema::employee("e").unwrap();
        assert_eq!(rows_per_statement(&emp), 65_535 / 7);
        assert!(rows_per_statement(&emp) * 7 <= MAX_BIND_PARAMS);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let schema = TableSchema::new("t", &["k", "v"], &["k"]).unwrap();
        let w = MemoryWriter::default();
        let batch = vec![rec(&["a", "1"]), rec(&["b", "2"])];

        w.upsert(&schema, &batch).await.unwrap();
        let once = w.table("t");
        w.upsert(&schema, &batch).await.unwrap();
        assert_eq!(w.table("t"), once);
        assert_eq!(once.len(), 2);
    }

    #[tokio::test]
    async fn conflict_overwrites_every_non_key_column() {
        let schema = TableSchema::employee("emp").unwrap();
        let w = MemoryWriter::default();
        w.upsert(&schema, &[rec(&["Alice", "a@x.com", "Y", "Y", "Y", "Y", "Y"])])
            .await
            .unwrap();
        let incoming = rec(&["Alice Smith", "a@x.com", "N", "N", "Y", "N", "N"]);
        w.upsert(&schema, &[incoming.clone()]).await.unwrap();

        let table = w.table("emp");
        assert_eq!(table.len(), 1);
        assert_eq!(table[&vec!["a@x.com".to_string()]], incoming.into_values());
    }

    #[tokio::test]
    async fn rows_absent_from_a_batch_are_kept() {
        let schema = TableSchema::new("t", &["k", "v"], &["k"]).unwrap();
        let w = MemoryWriter::default();
        w.upsert(&schema, &[rec(&["a", "1"])]).await.unwrap();
        w.upsert(&schema, &[rec(&["b", "2"])]).await.unwrap();
        assert_eq!(w.table("t").len(), 2);
    }

    #[tokio::test]
    async fn failed_batch_leaves_prior_state() {
        let schema = TableSchema::new("t", &["k", "v"], &["k"]).unwrap();
        let w = MemoryWriter {
            poison_key: Some("bad".into()),
            ..Default::default()
        };
        w.upsert(&schema, &[rec(&["a", "1"])]).await.unwrap();
        let before = w.table("t");

        let err = w
            .upsert(&schema, &[rec(&["a", "changed"]), rec(&["bad", "x"])])
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Constraint { .. }));
        assert_eq!(w.table("t"), before);
    }
}

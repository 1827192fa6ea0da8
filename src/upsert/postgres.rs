//! PostgreSQL write path.

use super::{rows_per_statement, upsert_statement, TableWriter};
use crate::error::{ResolutionError, WriteError};
use crate::normalize::Record;
use crate::schema::TableSchema;
use crate::secrets::SecretValue;
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, time::Duration};
use tokio::task::JoinHandle;
use tokio_postgres::{error::SqlState, types::ToSql, Client, Config as PgConfig, NoTls};
use tracing::{error, info};

const DEFAULT_PORT: u16 = 5432;

/// Connection parameters taken from the database secret.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    password: String,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl DbConfig {
    pub fn new(host: &str, port: u16, database: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// Read `host`, `port`, `database`, `user` and `password` from a secret object.
    pub fn from_secret(secret_name: &str, secret: &SecretValue) -> Result<Self, ResolutionError> {
        let map = secret.as_mapping().ok_or_else(|| ResolutionError::Malformed {
            name: secret_name.to_string(),
            message: "database secret must be a JSON object".into(),
        })?;

        let field = |key: &str| -> Result<String, ResolutionError> {
            match map.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(ResolutionError::MissingKey {
                    secret: secret_name.to_string(),
                    key: key.to_string(),
                }),
            }
        };

        let port = match map.get("port") {
            None | Some(Value::Null) => DEFAULT_PORT,
            Some(_) => field("port")?
                .trim()
                .parse::<u16>()
                .map_err(|_| ResolutionError::Malformed {
                    name: secret_name.to_string(),
                    message: "port is not a valid TCP port".into(),
                })?,
        };

        Ok(Self {
            host: field("host")?,
            port,
            database: field("database")?,
            user: field("user")?,
            password: field("password")?,
        })
    }
}

/// Opens one connection per batch, bounded by connect and statement timeouts.
#[derive(Debug, Clone)]
pub struct PgWriter {
    db: DbConfig,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

/// A live connection plus the task driving it. Dropping it closes both.
struct Session {
    client: Client,
    driver: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl PgWriter {
    pub fn new(db: DbConfig, connect_timeout: Duration, statement_timeout: Duration) -> Self {
        Self {
            db,
            connect_timeout,
            statement_timeout,
        }
    }

    pub fn pg_config(&self) -> PgConfig {
        let mut pg = PgConfig::new();
        pg.host(&self.db.host)
            .port(self.db.port)
            .dbname(&self.db.database)
            .user(&self.db.user)
            .connect_timeout(self.connect_timeout)
            .options(&format!(
                "-c statement_timeout={}",
                self.statement_timeout.as_millis()
            ))
            .application_name("vsa-sync");
        if !self.db.password.is_empty() {
            pg.password(&self.db.password);
        }
        pg
    }

    async fn connect(&self) -> Result<Session, WriteError> {
        let (client, connection) = self
            .pg_config()
            .connect(NoTls)
            .await
            .map_err(WriteError::Connect)?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {}", e);
            }
        });
        Ok(Session { client, driver })
    }
}

#[async_trait]
impl TableWriter for PgWriter {
    #[tracing::instrument(level = "info", skip_all, fields(table = schema.table(), records = records.len()))]
    async fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<u64, WriteError> {
        if records.is_empty() {
            info!("nothing to write");
            return Ok(0);
        }

        let mut session = self.connect().await?;
        let table = schema.table();
        let tx = session
            .client
            .transaction()
            .await
            .map_err(|e| classify(table, e))?;

        // dropping `tx` on an early return rolls the whole batch back
        for chunk in records.chunks(rows_per_statement(schema)) {
            let sql = upsert_statement(schema, chunk.len());
            let params: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|r| r.values().iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();
            tx.execute(sql.as_str(), &params)
                .await
                .map_err(|e| classify(table, e))?;
        }

        tx.commit().await.map_err(|e| classify(table, e))?;
        info!("committed upsert");
        Ok(records.len() as u64)
    }
}

fn classify(table: &str, err: tokio_postgres::Error) -> WriteError {
    let table = table.to_string();
    match err.code() {
        Some(code) if *code == SqlState::QUERY_CANCELED => WriteError::Timeout { table },
        Some(code) if code.code().starts_with("23") => WriteError::Constraint {
            table,
            message: db_message(&err),
        },
        _ => WriteError::Statement {
            table,
            message: db_message(&err),
        },
    }
}

fn db_message(err: &tokio_postgres::Error) -> String {
    err.as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string())
}

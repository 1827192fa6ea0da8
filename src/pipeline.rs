//! Dataset pipelines and the invocation entry point.
//!
//! Each dataset runs read → normalize → upsert to completion before the next
//! one starts. A failing dataset is recorded and the remaining ones still run;
//! the invocation reports success only when every dataset succeeded.

use crate::config::{SheetSource, SyncConfig};
use crate::error::{SyncError, ValidationError};
use crate::normalize::normalize;
use crate::schema::TableSchema;
use crate::secrets::{Resolver, SecretStore, SecretsManager};
use crate::sheets::{SheetCredentials, SheetLocator, SheetReader, SheetsClient};
use crate::upsert::{DbConfig, PgWriter, TableWriter};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// One worksheet → one destination table.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub label: &'static str,
    pub locator: SheetLocator,
    pub worksheet: String,
    pub schema: TableSchema,
}

impl Dataset {
    fn from_source<F>(label: &'static str, source: &SheetSource, schema: F) -> Result<Self, SyncError>
    where
        F: FnOnce(String) -> Result<TableSchema, ValidationError>,
    {
        Ok(Self {
            label,
            locator: SheetLocator::parse(&source.sheet_url)?,
            worksheet: source.worksheet.clone(),
            schema: schema(source.table.clone())?,
        })
    }

    /// Employee attributes first, then application classifications.
    pub fn all(cfg: &SyncConfig) -> Result<Vec<Self>, SyncError> {
        Ok(vec![
            Self::from_source("employee", &cfg.employee, |t| TableSchema::employee(t))?,
            Self::from_source("application", &cfg.application, |t| TableSchema::application(t))?,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub table: String,
    pub rows_read: usize,
    pub records_written: u64,
    pub duplicates_dropped: usize,
}

/// Read, normalize and upsert one dataset.
pub async fn run_dataset<R, W>(reader: &R, writer: &W, dataset: &Dataset) -> Result<DatasetReport, SyncError>
where
    R: SheetReader + ?Sized,
    W: TableWriter + ?Sized,
{
    let rows = reader.read(&dataset.locator, &dataset.worksheet).await?;
    for row in &rows {
        debug!(?row, "sheet row");
    }

    let records = normalize(&rows, &dataset.schema)?;
    let data_rows = rows.len().saturating_sub(1);
    let written = writer.upsert(&dataset.schema, &records).await?;

    Ok(DatasetReport {
        table: dataset.schema.table().to_string(),
        rows_read: data_rows,
        records_written: written,
        duplicates_dropped: data_rows - records.len(),
    })
}

/// Run every dataset in order; a failure does not stop the ones after it.
pub async fn run_datasets<R, W>(
    reader: &R,
    writer: &W,
    datasets: &[Dataset],
) -> Vec<(&'static str, Result<DatasetReport, SyncError>)>
where
    R: SheetReader + ?Sized,
    W: TableWriter + ?Sized,
{
    let mut outcomes = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let span = tracing::info_span!("dataset", name = dataset.label, table = dataset.schema.table());
        let start = Instant::now();
        let outcome = run_dataset(reader, writer, dataset).instrument(span.clone()).await;

        span.in_scope(|| match &outcome {
            Ok(report) => info!(
                rows = report.rows_read,
                written = report.records_written,
                duplicates = report.duplicates_dropped,
                elapsed = ?start.elapsed(),
                "dataset synced"
            ),
            Err(e) => error!(stage = e.stage(), error = %e, "dataset failed"),
        });
        outcomes.push((dataset.label, outcome));
    }
    outcomes
}

/// What the job returns to its trigger. Exactly one of two shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult {
    Success {
        #[serde(rename = "statusCode")]
        status_code: u16,
        message: String,
    },
    Failure {
        #[serde(rename = "statusCode")]
        status_code: u16,
        error: String,
    },
}

impl InvocationResult {
    pub fn success(message: impl Into<String>) -> Self {
        InvocationResult::Success {
            status_code: 200,
            message: message.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        InvocationResult::Failure {
            status_code: 500,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }
}

/// Fold per-dataset outcomes into one result.
pub fn summarize(outcomes: &[(&'static str, Result<DatasetReport, SyncError>)]) -> InvocationResult {
    let failures: Vec<String> = outcomes
        .iter()
        .filter_map(|(label, r)| r.as_ref().err().map(|e| format!("{}: {}", label, e)))
        .collect();

    if !failures.is_empty() {
        return InvocationResult::failure(failures.join("; "));
    }

    let parts: Vec<String> = outcomes
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok())
        .map(|r| format!("{} upserted {} records", r.table, r.records_written))
        .collect();
    InvocationResult::success(format!("Success: {}", parts.join("; ")))
}

/// Resolve credentials, then sync every configured dataset.
pub async fn run_job<S: SecretStore>(config: &SyncConfig, store: S) -> InvocationResult {
    let resolver = Resolver::new(store);
    let names = [config.sheets_secret.as_str(), config.database_secret.as_str()];

    let setup = async {
        let secrets = resolver.resolve_all(&names).await?;
        let (sheets_secret, db_secret) = (&secrets[0], &secrets[1]);

        let db = DbConfig::from_secret(&config.database_secret, db_secret)?;
        info!(host = %db.host, database = %db.database, "database target");
        let writer = PgWriter::new(db, config.connect_timeout, config.statement_timeout);

        let reader = SheetsClient::new(
            &config.sheets_api_base,
            SheetCredentials::from_secret(sheets_secret)?,
        )?;
        let datasets = Dataset::all(config)?;
        Ok::<_, SyncError>((reader, writer, datasets))
    };

    let (reader, writer, datasets) = match setup.await {
        Ok(parts) => parts,
        Err(e) => {
            error!(stage = e.stage(), error = %e, "job setup failed");
            return InvocationResult::failure(e.to_string());
        }
    };

    let outcomes = run_datasets(&reader, &writer, &datasets).await;
    summarize(&outcomes)
}

/// Entry point for one triggered invocation. The payload carries no parameters.
pub async fn handler(event: Value, request_id: &str) -> InvocationResult {
    let span = tracing::info_span!("invocation", request_id);
    async move {
        debug!(%event, "trigger payload");
        let start = Instant::now();

        let config = match SyncConfig::from_env() {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "configuration rejected");
                return InvocationResult::failure(e.to_string());
            }
        };

        let store = SecretsManager::connect(&config.region).await;
        let result = run_job(&config, store).await;
        match &result {
            InvocationResult::Success { message, .. } => {
                info!(elapsed = ?start.elapsed(), "{}", message)
            }
            InvocationResult::Failure { error, .. } => {
                error!(elapsed = ?start.elapsed(), "execution failed: {}", error)
            }
        }
        result
    }
    .instrument(span)
    .await
}

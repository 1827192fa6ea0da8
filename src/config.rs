// src/config.rs

use crate::error::ValidationError;
use std::{env, time::Duration};

static DEFAULT_REGION: &str = "us-east-1";
static DEFAULT_SHEETS_SECRET: &str = "vonage/googleapi/sheets";
static DEFAULT_DATABASE_SECRET: &str = "vonage/cloudquery/cloudquery";

static DEFAULT_EMPLOYEE_SHEET: &str = "https://docs.google.com/spreadsheets/d/19vvQgQkJg0y7g_P6L4yENgOnO-vAHDsg7dOX556ZXJM/edit?usp=sharing";
static DEFAULT_EMPLOYEE_WORKSHEET: &str = "VonagePersonVSAAttributes";
static DEFAULT_EMPLOYEE_TABLE: &str = "employee_vsa_attributes";

static DEFAULT_APPLICATION_SHEET: &str = "https://docs.google.com/spreadsheets/d/1lAWbVaBkee1ruKvIdIly33hRLlVv4b_HlexzXu1l2kI/edit?usp=sharing";
static DEFAULT_APPLICATION_WORKSHEET: &str = "Current VSA Master List";
static DEFAULT_APPLICATION_TABLE: &str = "vsa_app_classifications";

static DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

/// Where one dataset comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSource {
    pub sheet_url: String,
    pub worksheet: String,
    pub table: String,
}

/// Everything the job needs that is not a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub region: String,
    pub sheets_secret: String,
    pub database_secret: String,
    pub employee: SheetSource,
    pub application: SheetSource,
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
    pub sheets_api_base: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            sheets_secret: DEFAULT_SHEETS_SECRET.to_string(),
            database_secret: DEFAULT_DATABASE_SECRET.to_string(),
            employee: SheetSource {
                sheet_url: DEFAULT_EMPLOYEE_SHEET.to_string(),
                worksheet: DEFAULT_EMPLOYEE_WORKSHEET.to_string(),
                table: DEFAULT_EMPLOYEE_TABLE.to_string(),
            },
            application: SheetSource {
                sheet_url: DEFAULT_APPLICATION_SHEET.to_string(),
                worksheet: DEFAULT_APPLICATION_WORKSHEET.to_string(),
                table: DEFAULT_APPLICATION_TABLE.to_string(),
            },
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            statement_timeout: Duration::from_millis(DEFAULT_STATEMENT_TIMEOUT_MS),
            sheets_api_base: DEFAULT_SHEETS_API_BASE.to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `VSA_*` environment variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let text = |key: &str, slot: &mut String| {
            if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = v;
            }
        };

        text("VSA_SECRETS_REGION", &mut cfg.region);
        text("VSA_SHEETS_SECRET", &mut cfg.sheets_secret);
        text("VSA_DATABASE_SECRET", &mut cfg.database_secret);
        text("VSA_EMPLOYEE_SHEET_URL", &mut cfg.employee.sheet_url);
        text("VSA_EMPLOYEE_WORKSHEET", &mut cfg.employee.worksheet);
        text("VSA_EMPLOYEE_TABLE", &mut cfg.employee.table);
        text("VSA_APPLICATION_SHEET_URL", &mut cfg.application.sheet_url);
        text("VSA_APPLICATION_WORKSHEET", &mut cfg.application.worksheet);
        text("VSA_APPLICATION_TABLE", &mut cfg.application.table);
        text("VSA_SHEETS_API_BASE", &mut cfg.sheets_api_base);

        if let Some(secs) = parse_u64(&lookup, "VSA_DB_CONNECT_TIMEOUT_SECS")? {
            cfg.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "VSA_DB_STATEMENT_TIMEOUT_MS")? {
            cfg.statement_timeout = Duration::from_millis(ms);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connect_timeout.is_zero() {
            return Err(ValidationError::Config(
                "database connect timeout must be non-zero".into(),
            ));
        }
        if self.statement_timeout.is_zero() {
            return Err(ValidationError::Config(
                "database statement timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ValidationError::Config(format!("{} must be an unsigned integer, got `{}`", key, raw))),
    }
}

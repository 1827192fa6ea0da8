//! Error taxonomy for the sync job.
//!
//! Each pipeline stage has its own error type so the handler can tell a
//! secret lookup failure from a sheet read or a database write. `SyncError`
//! ties them together with the stage that raised them.

/// Secret retrieval failed.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("secret `{name}` not found")]
    NotFound { name: String },

    #[error("access denied to secret `{name}`: {message}")]
    AccessDenied { name: String, message: String },

    #[error("secret service error for `{name}`: {message}")]
    Service { name: String, message: String },

    #[error("secret `{name}` is malformed: {message}")]
    Malformed { name: String, message: String },

    #[error("secret `{secret}` is missing required key `{key}`")]
    MissingKey { secret: String, key: String },

    #[error("failed to retrieve required secrets: {}", .names.join(", "))]
    Missing { names: Vec<String> },
}

/// Spreadsheet access failed.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("invalid spreadsheet locator `{0}`")]
    InvalidLocator(String),

    #[error("sheet authentication failed: {0}")]
    Auth(String),

    #[error("spreadsheet `{0}` not found")]
    DocumentNotFound(String),

    #[error("worksheet `{worksheet}` not found in spreadsheet `{document}`")]
    WorksheetNotFound { document: String, worksheet: String },

    #[error("network error talking to {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("credential materialisation failed: {0}")]
    Materialize(#[from] std::io::Error),
}

/// Input did not have the shape a schema requires.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("row {row} has {found} cells but the schema needs {expected}")]
    ShortRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("schema for `{table}` is invalid: {message}")]
    Schema { table: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Destination write failed. The batch was not committed.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("connecting to database failed: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("statement timed out on `{table}`")]
    Timeout { table: String },

    #[error("constraint violation on `{table}`: {message}")]
    Constraint { table: String, message: String },

    #[error("upsert into `{table}` failed: {message}")]
    Statement { table: String, message: String },
}

/// Failure of one dataset pipeline, or of the shared setup before it.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl SyncError {
    /// Short stage name, used as a structured log field.
    pub fn stage(&self) -> &'static str {
        match self {
            SyncError::Resolution(_) => "resolve",
            SyncError::Read(_) => "read",
            SyncError::Validation(_) => "validate",
            SyncError::Write(_) => "write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_every_secret() {
        let err = ResolutionError::Missing {
            names: vec!["a/b".into(), "c/d".into()],
        };
        assert_eq!(err.to_string(), "failed to retrieve required secrets: a/b, c/d");
    }

    #[test]
    fn stage_follows_variant() {
        let err: SyncError = ValidationError::ShortRow {
            row: 3,
            expected: 7,
            found: 2,
        }
        .into();
        assert_eq!(err.stage(), "validate");
        assert_eq!(err.to_string(), "row 3 has 2 cells but the schema needs 7");
    }
}

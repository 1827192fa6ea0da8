//! Credential resolution from a secret store.
//!
//! Secrets are stored either as a JSON object or as an opaque string. The
//! shape is decided once, here, and handed on as a [`SecretValue`].

pub mod aws;

use crate::error::ResolutionError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{error, info};

pub use aws::SecretsManager;

/// A resolved secret.
#[derive(Clone, PartialEq)]
pub enum SecretValue {
    Text(String),
    Mapping(Map<String, Value>),
}

impl SecretValue {
    pub fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            SecretValue::Mapping(m) => Some(m),
            SecretValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SecretValue::Text(s) => Some(s),
            SecretValue::Mapping(_) => None,
        }
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::Text(_) => f.write_str("Text(<redacted>)"),
            SecretValue::Mapping(m) => f
                .debug_tuple("Mapping")
                .field(&m.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Decide the shape of a raw secret string.
///
/// Anything starting with `{` must be a JSON object; everything else is kept verbatim.
pub fn parse_secret(name: &str, raw: String) -> Result<SecretValue, ResolutionError> {
    if !raw.starts_with('{') {
        return Ok(SecretValue::Text(raw));
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(SecretValue::Mapping(map)),
        Ok(_) => Err(ResolutionError::Malformed {
            name: name.to_string(),
            message: "expected a JSON object".into(),
        }),
        // serde_json's message carries line/column only, never the secret text
        Err(e) => Err(ResolutionError::Malformed {
            name: name.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Backend that returns the raw string stored under a secret name.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<String, ResolutionError>;
}

/// Resolves secret names into typed values through a store handle.
pub struct Resolver<S> {
    store: S,
}

impl<S: SecretStore> Resolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<SecretValue, ResolutionError> {
        let raw = self.store.fetch(name).await?;
        let value = parse_secret(name, raw)?;
        info!(
            structured = value.as_mapping().is_some(),
            "resolved secret"
        );
        Ok(value)
    }

    /// Resolve every name, trying all of them before reporting the ones that failed.
    pub async fn resolve_all(&self, names: &[&str]) -> Result<Vec<SecretValue>, ResolutionError> {
        let mut values = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for &name in names {
            match self.resolve(name).await {
                Ok(v) => values.push(v),
                Err(e) => {
                    error!(secret = name, error = %e, "error retrieving secret");
                    missing.push(name.to_string());
                }
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            Err(ResolutionError::Missing { names: missing })
        }
    }
}

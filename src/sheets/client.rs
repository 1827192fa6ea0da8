// src/sheets/client.rs

use super::{tidy_rows, SheetCredentials, SheetLocator, SheetReader};
use crate::error::ReadError;
use crate::normalize::RawRow;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Google Sheets values API client.
pub struct SheetsClient {
    http: Client,
    base: Url,
    credentials: SheetCredentials,
}

impl SheetsClient {
    pub fn new(api_base: &str, credentials: SheetCredentials) -> Result<Self, ReadError> {
        let base = Url::parse(api_base).map_err(|_| ReadError::InvalidLocator(api_base.to_string()))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ReadError::Network {
                endpoint: api_base.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base,
            credentials,
        })
    }

    /// `{base}/spreadsheets/{id}/values/'{worksheet}'?majorDimension=ROWS`
    pub fn values_url(&self, document: &SheetLocator, worksheet: &str) -> Result<Url, ReadError> {
        let range = a1_sheet_range(worksheet);
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ReadError::InvalidLocator(self.base.to_string()))?
            .pop_if_empty()
            .extend(["spreadsheets", document.id(), "values", range.as_str()]);
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        Ok(url)
    }
}

/// A whole-sheet A1 range: the title quoted, embedded quotes doubled.
fn a1_sheet_range(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetReader for SheetsClient {
    #[tracing::instrument(level = "info", skip(self), fields(document = %document))]
    async fn read(&self, document: &SheetLocator, worksheet: &str) -> Result<Vec<RawRow>, ReadError> {
        let token = self.credentials.access_token(&self.http).await?;
        let url = self.values_url(document, worksheet)?;
        debug!(%url, "fetching worksheet values");

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|source| ReadError::Network {
                endpoint: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(classify(status, message, document, worksheet));
        }

        let range: ValueRange = resp.json().await.map_err(|source| ReadError::Network {
            endpoint: url.to_string(),
            source,
        })?;

        let rows: Vec<RawRow> = range
            .values
            .into_iter()
            .map(|r| r.into_iter().map(cell_text).collect())
            .collect();
        let rows = tidy_rows(rows);
        info!(rows = rows.len(), "read worksheet");
        Ok(rows)
    }
}

fn classify(status: StatusCode, message: String, document: &SheetLocator, worksheet: &str) -> ReadError {
    match status.as_u16() {
        401 | 403 => ReadError::Auth(message),
        404 => ReadError::DocumentNotFound(document.id().to_string()),
        400 if message.contains("Unable to parse range") => ReadError::WorksheetNotFound {
            document: document.id().to_string(),
            worksheet: worksheet.to_string(),
        },
        code => ReadError::Api {
            status: code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: &str) -> SheetsClient {
        let creds = SheetCredentials::from_secret(&crate::secrets::SecretValue::Mapping(
            json!({
                "client_secret": {"client_id": "id", "client_secret": "s"},
                "token": {"refresh_token": "r"}
            })
            .as_object()
            .unwrap()
            .clone(),
        ))
        .unwrap();
        SheetsClient::new(base, creds).unwrap()
    }

    #[test]
    fn values_url_quotes_and_encodes_the_title() {
        let c = client("https://sheets.googleapis.com/v4");
        let doc = SheetLocator::parse("1lAWbVaBkee1ruKvIdIly33hRLlVv4b_HlexzXu1l2kI").unwrap();
        let url = c.values_url(&doc, "Current VSA Master List").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/1lAWbVaBkee1ruKvIdIly33hRLlVv4b_HlexzXu1l2kI/values/'Current%20VSA%20Master%20List'?majorDimension=ROWS"
        );

        // trailing slash on the base does not double up
        let c = client("http://localhost:8080/v4/");
        let url = c.values_url(&doc, "Bob's").unwrap();
        assert!(url.path().ends_with("/values/'Bob''s'"));
        assert!(url.path().starts_with("/v4/spreadsheets/"));
    }

    #[test]
    fn cells_become_text() {
        assert_eq!(cell_text(json!("Y")), "Y");
        assert_eq!(cell_text(json!(42)), "42");
        assert_eq!(cell_text(Value::Null), "");
    }

    #[test]
    fn status_mapping() {
        let doc = SheetLocator::parse("1lAWbVaBkee1ruKvIdIly33hRLlVv4b_HlexzXu1l2kI").unwrap();
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, "no".into(), &doc, "w"),
            ReadError::Auth(_)
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, String::new(), &doc, "w"),
            ReadError::DocumentNotFound(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, "Unable to parse range: 'w'".into(), &doc, "w"),
            ReadError::WorksheetNotFound { .. }
        ));
        assert!(matches!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, "boom".into(), &doc, "w"),
            ReadError::Api { status: 500, .. }
        ));
    }
}

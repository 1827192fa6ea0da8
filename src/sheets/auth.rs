// src/sheets/auth.rs

use crate::error::ReadError;
use crate::secrets::SecretValue;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::debug;

static DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
static SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
static JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Bearer token for the sheets API.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Service-account key as issued by the cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Credential shapes the sheets secret may hold.
#[derive(Clone)]
pub enum SheetCredentials {
    ServiceAccount(ServiceAccountKey),
    /// Installed-app client secret plus a stored refresh token. The token
    /// exchange reads both from disk, so they are materialised per call.
    InstalledApp {
        client_secret: Map<String, Value>,
        token: Map<String, Value>,
    },
}

impl fmt::Debug for SheetCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetCredentials::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
            SheetCredentials::InstalledApp { .. } => f.write_str("InstalledApp(<redacted>)"),
        }
    }
}

impl SheetCredentials {
    pub fn from_secret(secret: &SecretValue) -> Result<Self, ReadError> {
        let map = secret.as_mapping().ok_or_else(|| {
            ReadError::Auth("sheet credentials must be a JSON object".into())
        })?;

        if map.get("type").and_then(Value::as_str) == Some("service_account") {
            let key: ServiceAccountKey = serde_json::from_value(Value::Object(map.clone()))
                .map_err(|e| ReadError::Auth(format!("service account key: {}", e)))?;
            return Ok(SheetCredentials::ServiceAccount(key));
        }

        match (
            map.get("client_secret").and_then(Value::as_object),
            map.get("token").and_then(Value::as_object),
        ) {
            (Some(client_secret), Some(token)) => Ok(SheetCredentials::InstalledApp {
                client_secret: client_secret.clone(),
                token: token.clone(),
            }),
            _ => Err(ReadError::Auth(
                "unrecognised credential shape: expected a service account key or client_secret + token".into(),
            )),
        }
    }

    /// Exchange these credentials for an access token.
    pub async fn access_token(&self, http: &Client) -> Result<AccessToken, ReadError> {
        match self {
            SheetCredentials::ServiceAccount(key) => service_account_token(http, key).await,
            SheetCredentials::InstalledApp {
                client_secret,
                token,
            } => {
                // removed on drop, whichever way this arm exits
                let files = MaterializedCredentials::write(client_secret, token)?;
                let app = InstalledApp::load(files.client_secret_path(), files.token_path())?;
                app.refresh(http).await
            }
        }
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Signed JWT assertion for the service-account grant.
pub fn service_account_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, ReadError> {
    let aud = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    let claims = Claims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| ReadError::Auth(format!("service account private key: {}", e)))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
        .map_err(|e| ReadError::Auth(format!("signing assertion: {}", e)))
}

async fn service_account_token(http: &Client, key: &ServiceAccountKey) -> Result<AccessToken, ReadError> {
    let assertion = service_account_assertion(key, Utc::now().timestamp())?;
    let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    debug!(client_email = %key.client_email, "requesting service account token");
    exchange(
        http,
        token_uri,
        &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
    )
    .await
}

async fn exchange(http: &Client, token_uri: &str, form: &[(&str, &str)]) -> Result<AccessToken, ReadError> {
    let resp = http
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|source| ReadError::Network {
            endpoint: token_uri.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ReadError::Auth(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            oauth_error_summary(&body)
        )));
    }

    let token: TokenResponse = resp.json().await.map_err(|source| ReadError::Network {
        endpoint: token_uri.to_string(),
        source,
    })?;
    Ok(AccessToken(token.access_token))
}

/// `error: error_description` from an OAuth error body, without echoing anything else.
fn oauth_error_summary(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |k: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(k))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match (field("error"), field("error_description")) {
        (Some(e), Some(d)) => format!("{}: {}", e, d),
        (Some(e), None) => e,
        _ => "unexpected response".to_string(),
    }
}

/// Client secret and token written to a private temporary directory.
/// The directory and both files are deleted when this value drops.
pub struct MaterializedCredentials {
    dir: TempDir,
    client_secret: PathBuf,
    token: PathBuf,
}

impl MaterializedCredentials {
    pub fn write(client_secret: &Map<String, Value>, token: &Map<String, Value>) -> Result<Self, ReadError> {
        let dir = tempfile::Builder::new().prefix("vsa-sheets-").tempdir()?;
        let client_secret_path = dir.path().join("client_secret.json");
        let token_path = dir.path().join("token.json");

        fs::write(&client_secret_path, serde_json::to_vec(client_secret).map_err(std::io::Error::from)?)?;
        fs::write(&token_path, serde_json::to_vec(token).map_err(std::io::Error::from)?)?;
        debug!(dir = %dir.path().display(), "materialised sheet credentials");

        Ok(Self {
            dir,
            client_secret: client_secret_path,
            token: token_path,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn client_secret_path(&self) -> &Path {
        &self.client_secret
    }

    pub fn token_path(&self) -> &Path {
        &self.token
    }
}

#[derive(Deserialize)]
struct ClientSecretInner {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenFile {
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Refresh-token client loaded from materialised credential files.
pub struct InstalledApp {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
}

impl InstalledApp {
    pub fn load(client_secret_path: &Path, token_path: &Path) -> Result<Self, ReadError> {
        // downloaded client secrets nest under "installed" or "web"
        let secret: Value = read_json(client_secret_path)?;
        let body = secret
            .get("installed")
            .or_else(|| secret.get("web"))
            .unwrap_or(&secret)
            .clone();
        let inner: ClientSecretInner = serde_json::from_value(body)
            .map_err(|_| ReadError::Auth("client secret has no client_id/client_secret".into()))?;
        let token: TokenFile = read_json(token_path)?;

        let token_uri = token
            .token_uri
            .or(inner.token_uri)
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        Ok(Self {
            client_id: inner.client_id,
            client_secret: inner.client_secret,
            refresh_token: token.refresh_token,
            token_uri,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn refresh(&self, http: &Client) -> Result<AccessToken, ReadError> {
        debug!(client_id = %self.client_id, "refreshing installed-app token");
        exchange(
            http,
            &self.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ],
        )
        .await
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ReadError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ReadError::Auth(format!(
            "reading {}: {}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("credentials"),
            e
        ))
    })
}

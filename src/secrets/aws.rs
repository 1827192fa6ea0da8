// src/secrets/aws.rs

use super::SecretStore;
use crate::error::ResolutionError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::{
    config::Region,
    error::{DisplayErrorContext, ProvideErrorMetadata},
    operation::get_secret_value::GetSecretValueError,
    Client,
};
use tracing::debug;

/// AWS Secrets Manager handle, built once per invocation for one region.
#[derive(Clone)]
pub struct SecretsManager {
    client: Client,
}

impl SecretsManager {
    /// Load the default AWS credential chain for `region`.
    pub async fn connect(region: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!(region, "secrets manager client ready");
        Self {
            client: Client::new(&shared),
        }
    }
}

#[async_trait]
impl SecretStore for SecretsManager {
    async fn fetch(&self, name: &str) -> Result<String, ResolutionError> {
        let out = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|err| {
                let message = DisplayErrorContext(&err).to_string();
                match err.as_service_error() {
                    Some(svc) => classify(name, svc, message),
                    None => ResolutionError::Service {
                        name: name.to_string(),
                        message,
                    },
                }
            })?;

        out.secret_string()
            .map(str::to_string)
            .ok_or_else(|| ResolutionError::Malformed {
                name: name.to_string(),
                message: "secret has no string value".into(),
            })
    }
}

fn classify(name: &str, err: &GetSecretValueError, message: String) -> ResolutionError {
    let name = name.to_string();
    match err {
        GetSecretValueError::ResourceNotFoundException(_) => ResolutionError::NotFound { name },
        GetSecretValueError::DecryptionFailure(_) => ResolutionError::AccessDenied { name, message },
        _ if matches!(err.code(), Some("AccessDeniedException")) => {
            ResolutionError::AccessDenied { name, message }
        }
        _ => ResolutionError::Service { name, message },
    }
}

//! AWS Secrets Manager secret store.
//!
//! Only compiled with the `aws` feature. Secrets are stored as
//! `SecretString` values; the Secrets Manager `VersionId` is passed through
//! as the version id.

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use super::client::SecretStore;
use super::error::{Result, SecretsError};
use super::types::StoredSecret;

/// Secret store backed by AWS Secrets Manager.
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    /// Create a store from a loaded SDK configuration.
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        tracing::info!(
            region = ?sdk_config.region().map(|r| r.to_string()),
            "AWS Secrets Manager store initialized"
        );
        Self { client: aws_sdk_secretsmanager::Client::new(sdk_config) }
    }
}

fn map_sdk_error<E, R>(id: &str, operation: &str, error: SdkError<E, R>) -> SecretsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let detail = format!("{} '{}' failed: {}", operation, id, DisplayErrorContext(&error));
    match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            SecretsError::connection_failed(detail)
        }
        _ => match error.code() {
            Some("AccessDeniedException") | Some("UnrecognizedClientException") => {
                SecretsError::access_denied(detail)
            }
            Some("ResourceNotFoundException") => SecretsError::not_found(id),
            Some("ResourceExistsException") => SecretsError::conflict(id, detail),
            Some("InternalServiceError") | Some("ThrottlingException") => {
                SecretsError::connection_failed(detail)
            }
            _ => SecretsError::backend_error(detail),
        },
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret(&self, id: &str) -> Result<Option<StoredSecret>> {
        let output = match self.client.get_secret_value().secret_id(id).send().await {
            Ok(output) => output,
            Err(e)
                if e.as_service_error().is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(map_sdk_error(id, "GetSecretValue", e)),
        };

        let value = output.secret_string().ok_or_else(|| {
            SecretsError::invalid_value(id, "secret has no SecretString (binary secrets unsupported)")
        })?;
        let version_id = output.version_id().unwrap_or_default();

        Ok(Some(StoredSecret::new(value, version_id)))
    }

    async fn create_secret(&self, id: &str, value: &str) -> Result<String> {
        let output = self
            .client
            .create_secret()
            .name(id)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| map_sdk_error(id, "CreateSecret", e))?;

        Ok(output.version_id().unwrap_or_default().to_string())
    }

    async fn put_secret_value(&self, id: &str, value: &str) -> Result<String> {
        let output = self
            .client
            .put_secret_value()
            .secret_id(id)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| map_sdk_error(id, "PutSecretValue", e))?;

        Ok(output.version_id().unwrap_or_default().to_string())
    }

    fn backend_name(&self) -> &'static str {
        "aws"
    }
}

//! GSA validation endpoint client.
//!
//! GSA exchanges a LINE user id for the store credential used by the sales
//! portal. It is a separate service from the bakery backend and answers with a
//! flat JSON object rather than the backend's envelope.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use bakery_points_core::LineUserId;

use crate::config::GsaConfig;
use crate::models::SalespersonCredential;

/// Errors that can occur when calling GSA.
#[derive(Debug, Error)]
pub enum GsaError {
    /// HTTP request failed before a status was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GSA answered with a non-success status.
    #[error("GSA returned status {0}")]
    Status(u16),

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// GSA answered `isValid: false`.
    #[error("user is not a valid salesperson")]
    Invalid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationRequest<'a> {
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResponse {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    is_valid: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    store_value: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    store_id: Option<String>,
}

/// GSA sends store ids as either JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Store credential exchange.
#[async_trait]
pub trait GsaApi: Send + Sync {
    /// Validate a LINE user and return their store credential.
    async fn validate(&self, user_id: &LineUserId) -> Result<SalespersonCredential, GsaError>;
}

/// `reqwest` client for the GSA validation endpoint.
#[derive(Clone)]
pub struct GsaClient {
    inner: Arc<GsaClientInner>,
}

struct GsaClientInner {
    client: reqwest::Client,
    validation_url: Url,
}

impl std::fmt::Debug for GsaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GsaClient")
            .field("validation_url", &self.inner.validation_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GsaClient {
    /// Create a new GSA client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GsaConfig) -> Result<Self, GsaError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(GsaClientInner {
                client,
                validation_url: config.validation_url.clone(),
            }),
        })
    }
}

#[async_trait]
impl GsaApi for GsaClient {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn validate(&self, user_id: &LineUserId) -> Result<SalespersonCredential, GsaError> {
        let response = self
            .inner
            .client
            .post(self.inner.validation_url.clone())
            .json(&ValidationRequest {
                user_id: user_id.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "GSA validation failed");
            return Err(GsaError::Status(status.as_u16()));
        }

        let body: ValidationResponse = response
            .json()
            .await
            .map_err(|e| GsaError::Parse(e.to_string()))?;

        if !body.is_valid {
            debug!("GSA reported user as invalid");
            return Err(GsaError::Invalid);
        }

        let (Some(store_id), Some(store_value)) = (body.store_id, body.store_value) else {
            return Err(GsaError::Parse(
                "valid response without store credential".to_string(),
            ));
        };

        // GSA echoes the user id; fall back to the one we asked about.
        let user_id = body
            .user_id
            .and_then(|id| LineUserId::parse(&id).ok())
            .unwrap_or_else(|| user_id.clone());

        Ok(SalespersonCredential {
            store_id,
            store_value,
            user_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn client_for(server: &MockServer) -> GsaClient {
        GsaClient::new(&GsaConfig {
            validation_url: Url::parse(&server.url("/gsa/validate")).unwrap(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn user() -> LineUserId {
        LineUserId::parse("U1").unwrap()
    }

    #[tokio::test]
    async fn test_validate_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/gsa/validate")
                .json_body(json!({"userId": "U1"}));
            then.status(200).json_body(json!({
                "userId": "U1",
                "isValid": true,
                "storeValue": "sv-abc",
                "storeId": 12
            }));
        });

        let credential = client_for(&server).validate(&user()).await.unwrap();
        assert_eq!(credential.store_id, "12");
        assert_eq!(credential.store_value, "sv-abc");
        assert_eq!(credential.user_id, user());
        mock.assert();
    }

    #[tokio::test]
    async fn test_validate_invalid_user() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/gsa/validate");
            then.status(200)
                .json_body(json!({"userId": "U1", "isValid": false}));
        });

        let err = client_for(&server).validate(&user()).await.unwrap_err();
        assert!(matches!(err, GsaError::Invalid));
    }

    #[tokio::test]
    async fn test_validate_forbidden() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/gsa/validate");
            then.status(403);
        });

        let err = client_for(&server).validate(&user()).await.unwrap_err();
        assert!(matches!(err, GsaError::Status(403)));
    }

    #[tokio::test]
    async fn test_validate_missing_credential() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/gsa/validate");
            then.status(200).json_body(json!({"isValid": true}));
        });

        let err = client_for(&server).validate(&user()).await.unwrap_err();
        assert!(matches!(err, GsaError::Parse(_)));
    }
}

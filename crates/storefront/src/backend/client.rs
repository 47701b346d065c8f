//! `reqwest` implementation of [`BackendApi`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, instrument};
use url::Url;

use bakery_points_core::{LineUserId, UserId};

use super::types::{Envelope, PurchasePayload};
use super::{BackendApi, BackendError, CustomerLookup, PurchaseAck, PurchaseSubmission};
use crate::config::BackendConfig;
use crate::models::{
    CustomerRecord, PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct,
};

/// Longest slice of a response body copied into logs and errors.
const MAX_LOGGED_BODY: usize = 500;

/// Client for the bakery backend REST API.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        // Url::join drops the last path segment unless the base ends with '/'
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(BackendClientInner { client, base_url }),
        })
    }

    /// Base URL all endpoint paths are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Send a request and decode the response envelope.
    async fn execute<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Envelope<T>, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;
        let mut request = self.inner.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(
                status = %status,
                body = %truncate(&text),
                "Backend returned non-success status"
            );
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
                .ok()
                .and_then(|envelope| envelope.message.or(envelope.error));
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                body = %truncate(&text),
                "Failed to parse backend response"
            );
            BackendError::Parse(e.to_string())
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>, BackendError> {
        self.execute::<T, ()>(Method::GET, path, query, None).await
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<Envelope<T>, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        self.execute(Method::POST, path, &[], Some(body)).await
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_LOGGED_BODY).collect()
}

#[async_trait]
impl BackendApi for BackendClient {
    #[instrument(skip(self, lookup), fields(line_id = %lookup.line_id))]
    async fn resolve_customer(
        &self,
        lookup: &CustomerLookup,
    ) -> Result<Option<CustomerRecord>, BackendError> {
        let customer = self
            .post::<CustomerRecord, _>("api/customer/line/customer", lookup)
            .await?
            .into_data()?;
        debug!(found = customer.is_some(), "Resolved customer");
        Ok(customer)
    }

    #[instrument(skip(self))]
    async fn points_balance(&self, user_id: UserId) -> Result<PointsBalance, BackendError> {
        self.get(&format!("api/points/balance/{user_id}"), &[])
            .await?
            .into_required()
    }

    #[instrument(skip(self))]
    async fn virtual_cards(&self) -> Result<Vec<VirtualCardProduct>, BackendError> {
        let cards: Vec<VirtualCardProduct> = self
            .get("api/points/virtual-cards", &[])
            .await?
            .into_data()?
            .unwrap_or_default();
        debug!(count = cards.len(), "Fetched virtual card catalog");
        Ok(cards)
    }

    #[instrument(
        skip(self, submission),
        fields(
            product_id = %submission.virtual_card_product_id,
            payment_method = %submission.payment_method,
        )
    )]
    async fn purchase_virtual_card(
        &self,
        submission: &PurchaseSubmission,
    ) -> Result<PurchaseAck, BackendError> {
        let envelope: Envelope<PurchasePayload> = self
            .post("api/points/virtual-cards/purchase", submission)
            .await?;
        let message = envelope.message.clone();
        let payload = envelope.into_data()?.unwrap_or_default();
        Ok(PurchaseAck {
            message,
            order_number: payload.order_number(),
        })
    }

    #[instrument(skip(self))]
    async fn purchase_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<PurchaseRecord>, BackendError> {
        Ok(self
            .get(
                &format!("api/points/virtual-cards/purchases/{user_id}"),
                &[("limit", limit.to_string())],
            )
            .await?
            .into_data()?
            .unwrap_or_default())
    }

    #[instrument(skip(self), fields(line_user_id = %line_user_id))]
    async fn transactions(
        &self,
        line_user_id: &LineUserId,
        limit: u32,
    ) -> Result<Vec<PointsTransaction>, BackendError> {
        let path = format!(
            "api/points/transactions/{}",
            urlencoding::encode(line_user_id.as_str())
        );
        Ok(self
            .get(&path, &[("limit", limit.to_string())])
            .await?
            .into_data()?
            .unwrap_or_default())
    }
}

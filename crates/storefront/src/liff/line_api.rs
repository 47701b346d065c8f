//! LIFF SDK backed by the LINE platform HTTP APIs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use bakery_points_core::LineUserId;

use super::messages::validate_batch;
use super::{ClientDirective, LiffError, LiffInitConfig, LiffSdk, LineMessage};
use crate::config::LineConfig;
use crate::models::LineProfile;

/// Marker the LINE in-app browser puts in its User-Agent.
const IN_CLIENT_UA_MARKER: &str = "Line/";

/// Result of verifying a LIFF access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub scope: String,
    pub client_id: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: &'a [LineMessage],
}

/// HTTP client for the LINE platform, shared by every request's SDK handle.
#[derive(Clone)]
pub struct LineApiClient {
    inner: Arc<LineApiClientInner>,
}

struct LineApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    channel_access_token: Option<SecretString>,
}

impl std::fmt::Debug for LineApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field(
                "channel_access_token",
                &self.inner.channel_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl LineApiClient {
    /// Create a new LINE platform client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &LineConfig, timeout: std::time::Duration) -> Result<Self, LiffError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let mut base_url = config.api_base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(LineApiClientInner {
                client,
                base_url,
                channel_access_token: config.channel_access_token.clone(),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, LiffError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| LiffError::Parse(e.to_string()))
    }

    /// Verify a LIFF access token.
    ///
    /// Returns `None` when LINE reports the token as invalid or expired.
    ///
    /// # Errors
    ///
    /// Returns error on network failures and unexpected statuses.
    #[instrument(skip_all)]
    pub async fn verify_access_token(
        &self,
        access_token: &SecretString,
    ) -> Result<Option<TokenInfo>, LiffError> {
        let response = self
            .inner
            .client
            .get(self.endpoint("oauth2/v2.1/verify")?)
            .query(&[("access_token", access_token.expose_secret())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map(Some)
                .map_err(|e| LiffError::Parse(e.to_string())),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                debug!("LINE rejected access token");
                Ok(None)
            }
            status => Err(api_error(status, response).await),
        }
    }

    /// Fetch the profile of the token's owner.
    ///
    /// # Errors
    ///
    /// Returns `NotLoggedIn` if the token is no longer accepted.
    #[instrument(skip_all)]
    pub async fn profile(&self, access_token: &SecretString) -> Result<LineProfile, LiffError> {
        let response = self
            .inner
            .client
            .get(self.endpoint("v2/profile")?)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| LiffError::Parse(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(LiffError::NotLoggedIn),
            status => Err(api_error(status, response).await),
        }
    }

    /// Push messages to a user through the Messaging API.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` without a channel access token, or the API error.
    #[instrument(skip(self, messages), fields(to = %to, count = messages.len()))]
    pub async fn push(&self, to: &LineUserId, messages: &[LineMessage]) -> Result<(), LiffError> {
        let token = self
            .inner
            .channel_access_token
            .as_ref()
            .ok_or(LiffError::NotConfigured("LINE_CHANNEL_ACCESS_TOKEN"))?;

        let response = self
            .inner
            .client
            .post(self.endpoint("v2/bot/message/push")?)
            .bearer_auth(token.expose_secret())
            .json(&PushRequest {
                to: to.as_str(),
                messages,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        info!("Pushed LINE messages");
        Ok(())
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> LiffError {
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error_description))
        .unwrap_or(text);
    warn!(status = %status, message = %message, "LINE API error");
    LiffError::Api {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Default)]
struct SdkState {
    ready: bool,
    logged_in: bool,
    user_id: Option<LineUserId>,
}

/// One page's SDK handle, bound to the access token the page supplied.
pub struct LineApiSdk {
    api: LineApiClient,
    access_token: Option<SecretString>,
    in_client: bool,
    state: Mutex<SdkState>,
    directives: Mutex<Vec<ClientDirective>>,
}

impl std::fmt::Debug for LineApiSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineApiSdk")
            .field("has_access_token", &self.access_token.is_some())
            .field("in_client", &self.in_client)
            .finish_non_exhaustive()
    }
}

impl LineApiSdk {
    /// Create a handle for a page.
    #[must_use]
    pub fn new(api: LineApiClient, access_token: Option<SecretString>, in_client: bool) -> Self {
        Self {
            api,
            access_token,
            in_client,
            state: Mutex::new(SdkState::default()),
            directives: Mutex::new(Vec::new()),
        }
    }

    /// Whether a User-Agent belongs to the LINE in-app browser.
    #[must_use]
    pub fn is_line_user_agent(user_agent: &str) -> bool {
        user_agent.contains(IN_CLIENT_UA_MARKER)
    }

    fn state(&self) -> MutexGuard<'_, SdkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_directive(&self, directive: ClientDirective) {
        self.directives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(directive);
    }

    fn require_ready(&self) -> Result<(), LiffError> {
        if self.state().ready {
            Ok(())
        } else {
            Err(LiffError::NotInitialized)
        }
    }

    fn logged_in_token(&self) -> Result<&SecretString, LiffError> {
        self.require_ready()?;
        match &self.access_token {
            Some(token) if self.state().logged_in => Ok(token),
            _ => Err(LiffError::NotLoggedIn),
        }
    }
}

#[async_trait]
impl LiffSdk for LineApiSdk {
    #[instrument(skip(self), fields(liff_id = %config.liff_id))]
    async fn init(&self, config: &LiffInitConfig) -> Result<(), LiffError> {
        if self.is_ready() {
            return Ok(());
        }

        let logged_in = match &self.access_token {
            None => false,
            Some(token) => match self.api.verify_access_token(token).await? {
                None => false,
                Some(info) => {
                    let channel_id = LineConfig::channel_id(&config.liff_id);
                    if info.client_id != channel_id {
                        return Err(LiffError::Init(format!(
                            "access token belongs to channel {}",
                            info.client_id
                        )));
                    }
                    info.expires_in > 0
                }
            },
        };

        {
            let mut state = self.state();
            state.ready = true;
            state.logged_in = logged_in;
        }

        if !logged_in && !self.in_client && config.with_login_on_external_browser {
            self.push_directive(ClientDirective::Login);
        }
        debug!(logged_in, in_client = self.in_client, "LIFF initialized");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.state().ready
    }

    fn is_logged_in(&self) -> bool {
        let state = self.state();
        state.ready && state.logged_in
    }

    fn is_in_client(&self) -> bool {
        self.in_client
    }

    async fn login(&self) -> Result<(), LiffError> {
        self.require_ready()?;
        self.push_directive(ClientDirective::Login);
        Ok(())
    }

    async fn logout(&self) -> Result<(), LiffError> {
        self.require_ready()?;
        {
            let mut state = self.state();
            state.logged_in = false;
            state.user_id = None;
        }
        self.push_directive(ClientDirective::Logout);
        Ok(())
    }

    async fn get_profile(&self) -> Result<LineProfile, LiffError> {
        let token = self.logged_in_token()?;
        let profile = self.api.profile(token).await?;
        self.state().user_id = Some(profile.user_id.clone());
        Ok(profile)
    }

    async fn send_messages(&self, messages: &[LineMessage]) -> Result<(), LiffError> {
        self.logged_in_token()?;
        if !self.in_client {
            return Err(LiffError::NotInClient);
        }
        validate_batch(messages).map_err(LiffError::InvalidMessages)?;

        let known = self.state().user_id.clone();
        let user_id = match known {
            Some(user_id) => user_id,
            None => self.get_profile().await?.user_id,
        };
        self.api.push(&user_id, messages).await
    }

    async fn close_window(&self) -> Result<(), LiffError> {
        self.require_ready()?;
        if !self.in_client {
            return Err(LiffError::NotInClient);
        }
        self.push_directive(ClientDirective::CloseWindow);
        Ok(())
    }

    fn take_directives(&self) -> Vec<ClientDirective> {
        std::mem::take(&mut *self.directives.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    const LIFF_ID: &str = "1657000000-AbCdEf12";

    fn line_config(server: &MockServer, channel_token: Option<&str>) -> LineConfig {
        LineConfig {
            liff_id: LIFF_ID.to_string(),
            sales_liff_id: LIFF_ID.to_string(),
            channel_access_token: channel_token.map(SecretString::from),
            login_on_external_browser: true,
            api_base_url: Url::parse(&server.base_url()).unwrap(),
        }
    }

    fn init_config() -> LiffInitConfig {
        LiffInitConfig {
            liff_id: LIFF_ID.to_string(),
            with_login_on_external_browser: true,
        }
    }

    fn sdk(server: &MockServer, token: Option<&str>, in_client: bool) -> LineApiSdk {
        let config = line_config(server, Some("channel-token"));
        let api = LineApiClient::new(&config, Duration::from_secs(5)).unwrap();
        LineApiSdk::new(api, token.map(SecretString::from), in_client)
    }

    fn mock_verify(server: &MockServer, client_id: &str) {
        server.mock(|when, then| {
            when.method(GET)
                .path("/oauth2/v2.1/verify")
                .query_param("access_token", "liff-token");
            then.status(200).json_body(json!({
                "scope": "profile openid",
                "client_id": client_id,
                "expires_in": 2_591_659
            }));
        });
    }

    #[test]
    fn test_is_line_user_agent() {
        assert!(LineApiSdk::is_line_user_agent(
            "Mozilla/5.0 (iPhone) AppleWebKit/605.1.15 Safari Line/13.20.0"
        ));
        assert!(!LineApiSdk::is_line_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"));
    }

    #[tokio::test]
    async fn test_init_with_valid_token() {
        let server = MockServer::start();
        mock_verify(&server, "1657000000");

        let sdk = sdk(&server, Some("liff-token"), true);
        assert!(!sdk.is_logged_in());
        sdk.init(&init_config()).await.unwrap();
        assert!(sdk.is_ready());
        assert!(sdk.is_logged_in());
        assert!(sdk.take_directives().is_empty());
    }

    #[tokio::test]
    async fn test_init_with_rejected_token_is_logged_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/oauth2/v2.1/verify");
            then.status(400).json_body(json!({
                "error": "invalid_request",
                "error_description": "access token expired"
            }));
        });

        let sdk = sdk(&server, Some("liff-token"), false);
        sdk.init(&init_config()).await.unwrap();
        assert!(sdk.is_ready());
        assert!(!sdk.is_logged_in());
        assert_eq!(sdk.take_directives(), vec![ClientDirective::Login]);
    }

    #[tokio::test]
    async fn test_init_rejects_foreign_channel() {
        let server = MockServer::start();
        mock_verify(&server, "1999999999");

        let sdk = sdk(&server, Some("liff-token"), true);
        let err = sdk.init(&init_config()).await.unwrap_err();
        assert!(matches!(err, LiffError::Init(_)));
        assert!(!sdk.is_ready());
    }

    #[tokio::test]
    async fn test_init_server_error_propagates() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/oauth2/v2.1/verify");
            then.status(503).body("unavailable");
        });

        let sdk = sdk(&server, Some("liff-token"), true);
        let err = sdk.init(&init_config()).await.unwrap_err();
        assert!(matches!(err, LiffError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_profile_and_push() {
        let server = MockServer::start();
        mock_verify(&server, "1657000000");
        server.mock(|when, then| {
            when.method(GET)
                .path("/v2/profile")
                .header("authorization", "Bearer liff-token");
            then.status(200).json_body(json!({
                "userId": "U4af4980629",
                "displayName": "小明",
                "pictureUrl": "https://profile.line-scdn.net/abc"
            }));
        });
        let push = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/bot/message/push")
                .header("authorization", "Bearer channel-token")
                .json_body(json!({
                    "to": "U4af4980629",
                    "messages": [{"type": "text", "text": "謝謝"}]
                }));
            then.status(200).json_body(json!({}));
        });

        let sdk = sdk(&server, Some("liff-token"), true);
        sdk.init(&init_config()).await.unwrap();
        let profile = sdk.get_profile().await.unwrap();
        assert_eq!(profile.display_name, "小明");

        sdk.send_messages(&[LineMessage::text("謝謝")]).await.unwrap();
        push.assert();
    }

    #[tokio::test]
    async fn test_send_requires_channel_token() {
        let server = MockServer::start();
        mock_verify(&server, "1657000000");
        server.mock(|when, then| {
            when.method(GET).path("/v2/profile");
            then.status(200)
                .json_body(json!({"userId": "U1", "displayName": "小明"}));
        });

        let api = LineApiClient::new(&line_config(&server, None), Duration::from_secs(5)).unwrap();
        let sdk = LineApiSdk::new(api, Some(SecretString::from("liff-token")), true);
        sdk.init(&init_config()).await.unwrap();

        let err = sdk
            .send_messages(&[LineMessage::text("謝謝")])
            .await
            .unwrap_err();
        assert!(matches!(err, LiffError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_directives() {
        let server = MockServer::start();
        let sdk = sdk(&server, None, true);
        assert!(matches!(sdk.login().await, Err(LiffError::NotInitialized)));

        sdk.init(&init_config()).await.unwrap();
        assert!(!sdk.is_logged_in());
        sdk.login().await.unwrap();
        sdk.close_window().await.unwrap();
        sdk.logout().await.unwrap();
        assert_eq!(
            sdk.take_directives(),
            vec![
                ClientDirective::Login,
                ClientDirective::CloseWindow,
                ClientDirective::Logout
            ]
        );
        assert!(sdk.take_directives().is_empty());
    }

    #[tokio::test]
    async fn test_close_window_outside_client() {
        let server = MockServer::start();
        let sdk = sdk(&server, None, false);
        sdk.init(&init_config()).await.unwrap();
        assert!(matches!(
            sdk.close_window().await,
            Err(LiffError::NotInClient)
        ));
    }
}

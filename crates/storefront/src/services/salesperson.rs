//! Salesperson authentication.
//!
//! Once the LINE session is logged in, the LINE user id is exchanged with GSA
//! for a store credential that authenticates sales-portal API calls. The
//! credential is cached in local storage (`salespersonInfo`) so a reload does
//! not repeat the exchange. The cache is only trusted for the LINE user it was
//! issued to.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use bakery_points_core::LineUserId;

use super::gsa::{GsaApi, GsaError};
use super::session::{SessionContext, SessionState};
use crate::liff::LiffSdk;
use crate::models::{SalespersonCredential, storage_keys};
use crate::storage::{CachedRecord, LocalStore};

/// Category of a failed credential exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SalespersonAuthErrorKind {
    InvalidUser,
    NoPermission,
    ServerError,
    Generic,
}

impl SalespersonAuthErrorKind {
    /// Categorize an HTTP status from GSA.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 | 404 => Self::InvalidUser,
            401 | 403 => Self::NoPermission,
            500..=599 => Self::ServerError,
            _ => Self::Generic,
        }
    }

    /// Categorize a GSA client error.
    #[must_use]
    pub fn from_gsa_error(error: &GsaError) -> Self {
        match error {
            GsaError::Status(status) => Self::from_status(*status),
            GsaError::Invalid => Self::NoPermission,
            GsaError::Http(e) => e
                .status()
                .map_or(Self::Generic, |status| Self::from_status(status.as_u16())),
            GsaError::Parse(_) => Self::Generic,
        }
    }

    /// Message shown to the salesperson.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidUser => "無效的使用者，請重新登入",
            Self::NoPermission => "您沒有業務員權限",
            Self::ServerError => "伺服器錯誤，請稍後再試",
            Self::Generic => "驗證失敗，請稍後再試",
        }
    }
}

/// Serializable view of the salesperson session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalespersonSnapshot {
    pub is_authenticated: bool,
    pub store_id: Option<String>,
    pub user_id: Option<LineUserId>,
    pub error: Option<SalespersonAuthErrorKind>,
    pub error_message: Option<&'static str>,
}

#[derive(Debug, Default)]
struct AuthData {
    credential: Option<SalespersonCredential>,
    error: Option<SalespersonAuthErrorKind>,
}

/// Salesperson credential holder for one page.
pub struct SalespersonAuth {
    gsa: Arc<dyn GsaApi>,
    cache: CachedRecord<SalespersonCredential>,
    data: Mutex<AuthData>,
}

impl std::fmt::Debug for SalespersonAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalespersonAuth")
            .field("is_authenticated", &self.is_authenticated())
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}

impl SalespersonAuth {
    #[must_use]
    pub fn new(gsa: Arc<dyn GsaApi>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            gsa,
            cache: CachedRecord::new(store, storage_keys::SALESPERSON_INFO),
            data: Mutex::new(AuthData::default()),
        }
    }

    fn data(&self) -> MutexGuard<'_, AuthData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adopt a credential cached by a previous page, if it was issued to
    /// `owner`.
    ///
    /// A credential cached for another LINE user is discarded.
    pub async fn restore(&self, owner: &LineUserId) -> Option<SalespersonCredential> {
        let cached = self.cache.get_cached().await?;
        if cached.user_id != *owner {
            warn!(
                cached_user = %cached.user_id,
                user = %owner,
                "Discarding salesperson credential cached for another LINE user"
            );
            self.forget().await;
            return None;
        }
        debug!(store_id = %cached.store_id, "Restored cached salesperson credential");
        self.data().credential = Some(cached.clone());
        Some(cached)
    }

    /// Exchange automatically once the LINE session is logged in.
    ///
    /// Only a credential issued to the logged-in LINE user is reused; anything
    /// else is dropped and the exchange runs again. Without a logged-in user
    /// nothing is adopted.
    pub async fn on_session_ready(&self, session: &SessionContext) -> Option<SalespersonCredential> {
        let profile = match (session.state(), session.profile()) {
            (SessionState::ReadyLoggedIn, Some(profile)) => profile,
            (SessionState::ReadyLoggedOut, _) => {
                self.forget().await;
                return None;
            }
            _ => {
                self.data().credential = None;
                return None;
            }
        };

        if let Some(credential) = self.credential() {
            if credential.user_id == profile.user_id {
                return Some(credential);
            }
            self.forget().await;
        }
        if let Some(credential) = self.restore(&profile.user_id).await {
            return Some(credential);
        }
        self.authenticate(&profile.user_id).await.ok()
    }

    async fn forget(&self) {
        self.cache.invalidate().await;
        self.data().credential = None;
    }

    /// Exchange a LINE user id for a store credential.
    ///
    /// # Errors
    ///
    /// Returns the failure category; the raw error is only logged.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn authenticate(
        &self,
        user_id: &LineUserId,
    ) -> Result<SalespersonCredential, SalespersonAuthErrorKind> {
        match self.gsa.validate(user_id).await {
            Ok(credential) => {
                if let Err(e) = self.cache.store(&credential).await {
                    warn!(error = %e, "Failed to cache salesperson credential");
                }
                let mut data = self.data();
                data.credential = Some(credential.clone());
                data.error = None;
                info!(store_id = %credential.store_id, "Salesperson authenticated");
                Ok(credential)
            }
            Err(e) => {
                let kind = SalespersonAuthErrorKind::from_gsa_error(&e);
                warn!(error = %e, ?kind, "Salesperson authentication failed");
                self.cache.invalidate().await;
                let mut data = self.data();
                data.credential = None;
                data.error = Some(kind);
                Err(kind)
            }
        }
    }

    /// Clear the credential and, inside LINE, close the window.
    pub async fn logout(&self, sdk: Option<&dyn LiffSdk>) {
        self.cache.invalidate().await;
        *self.data() = AuthData::default();
        info!("Salesperson logged out");

        if let Some(sdk) = sdk.filter(|sdk| sdk.is_in_client()) {
            if let Err(e) = sdk.close_window().await {
                debug!(error = %e, "Close window after logout failed");
            }
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.data().credential.is_some()
    }

    #[must_use]
    pub fn credential(&self) -> Option<SalespersonCredential> {
        self.data().credential.clone()
    }

    #[must_use]
    pub fn error(&self) -> Option<SalespersonAuthErrorKind> {
        self.data().error
    }

    /// Headers authenticating a sales-portal request.
    #[must_use]
    pub fn auth_headers(&self) -> Option<HeaderMap> {
        let credential = self.credential()?;
        let mut headers = HeaderMap::new();
        for (name, value) in credential.auth_headers() {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(e) => {
                    warn!(header = name, error = %e, "Credential is not a valid header value");
                    return None;
                }
            }
        }
        Some(headers)
    }

    #[must_use]
    pub fn snapshot(&self) -> SalespersonSnapshot {
        let data = self.data();
        SalespersonSnapshot {
            is_authenticated: data.credential.is_some(),
            store_id: data.credential.as_ref().map(|c| c.store_id.clone()),
            user_id: data.credential.as_ref().map(|c| c.user_id.clone()),
            error: data.error,
            error_message: data.error.map(SalespersonAuthErrorKind::message),
        }
    }
}

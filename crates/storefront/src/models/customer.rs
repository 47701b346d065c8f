//! LINE profile and customer record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakery_points_core::{LineUserId, UserId};

/// The LINE profile of the logged-in user.
///
/// Obtained from the LIFF SDK after login and immutable for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineProfile {
    /// LINE platform user id.
    pub user_id: LineUserId,
    /// Display name chosen by the user in LINE.
    pub display_name: String,
    /// Profile picture URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    /// Status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Email, only present when the LIFF app has the `email` scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Customer record as returned by the backend (`customerData`).
///
/// `id` is the internal user id used by the points endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub line_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CustomerRecord {
    /// Name to greet the customer with, falling back to the LINE display name.
    #[must_use]
    pub fn greeting_name<'a>(&'a self, profile: Option<&'a LineProfile>) -> &'a str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| profile.map(|p| p.display_name.as_str()))
            .unwrap_or("")
    }
}

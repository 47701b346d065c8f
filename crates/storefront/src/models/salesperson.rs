//! Salesperson credential.

use serde::{Deserialize, Serialize};

use bakery_points_core::LineUserId;

/// Header carrying the salesperson's store id on sales-portal calls.
pub const STORE_ID_HEADER: &str = "x-store-id";

/// Header carrying the salesperson's store value on sales-portal calls.
pub const STORE_VALUE_HEADER: &str = "x-store-value";

/// Store credential obtained by validating a LINE identity with GSA.
///
/// Cached in local storage (`salespersonInfo`) and attached to every
/// sales-portal API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalespersonCredential {
    pub store_id: String,
    pub store_value: String,
    pub user_id: LineUserId,
}

impl SalespersonCredential {
    /// Header pairs that authenticate a sales-portal request.
    #[must_use]
    pub fn auth_headers(&self) -> [(&'static str, &str); 2] {
        [
            (STORE_ID_HEADER, self.store_id.as_str()),
            (STORE_VALUE_HEADER, self.store_value.as_str()),
        ]
    }
}

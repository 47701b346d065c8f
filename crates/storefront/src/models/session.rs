//! Session-related types.
//!
//! Keys under which per-browser state is kept in local storage.

/// Local storage keys.
pub mod storage_keys {
    /// Cached `CustomerRecord` JSON.
    pub const CUSTOMER_DATA: &str = "customerData";

    /// Cached `SalespersonCredential` JSON.
    pub const SALESPERSON_INFO: &str = "salespersonInfo";

    /// Cart line items.
    pub const BAKERY_CART: &str = "bakeryCart";

    /// Cached `LineProfile`, used when LIFF initialization fails.
    pub const LIFF_USER_PROFILE: &str = "liffUserProfile";

    /// Last LIFF access token handed over by the page, used by the fallback SDK handle.
    pub const LIFF_ACCESS_TOKEN: &str = "liffAccessToken";
}

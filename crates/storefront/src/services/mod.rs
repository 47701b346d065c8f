//! Flows the storefront runs on behalf of a page.
//!
//! # Services
//!
//! - `session` - LIFF bootstrap, login state, cached identity
//! - `points` - Virtual card catalog, purchase and checkout
//! - `notification` - LINE message countdown, send and window close
//! - `salesperson` - GSA credential exchange for the sales portal
//! - `cart` - Cart stored in local storage
//! - `confirmation` - Checkout confirmation page parameters
//! - `gsa` - GSA validation endpoint client

pub mod cart;
pub mod confirmation;
pub mod gsa;
pub mod notification;
pub mod points;
pub mod salesperson;
pub mod session;

pub use cart::{CartService, CartServiceError};
pub use confirmation::{ConfirmationError, ConfirmationKind, ConfirmationParams};
pub use gsa::{GsaApi, GsaClient, GsaError};
pub use notification::{NotificationFlow, NotificationStatus};
pub use points::{
    CheckoutOutcome, PurchaseFlow, PurchaseMarker, PurchaseOutcome, PurchaseRequest, PurchasedLine,
};
pub use salesperson::{SalespersonAuth, SalespersonAuthErrorKind, SalespersonSnapshot};
pub use session::{
    IdentityError, ResolvedIdentity, SessionContext, SessionSnapshot, SessionState,
};

//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions, in-memory store)
//!
//! The LIFF page context is not a layer: handlers take [`LiffPage`] or
//! [`SalesPage`] as an extractor.

pub mod liff;
pub mod request_id;
pub mod session;

pub use liff::{LiffPage, SalesPage, bearer_token, page_key};
pub use request_id::{RequestId, request_id_middleware};
pub use session::create_session_layer;

//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Health check
//!
//! # Pages
//! GET  /points                      - Points page (catalog, balance, history)
//! GET  /checkout/confirmation       - Checkout confirmation page
//!
//! # Session (LIFF token as bearer)
//! POST /api/session                 - Initialize and report the session
//! POST /api/session/login           - Start LINE login
//! POST /api/session/logout          - Log out, clear cached identity
//!
//! # Points
//! GET  /api/points/catalog          - Virtual card catalog
//! GET  /api/points/balance          - Points balance
//! GET  /api/points/history          - Purchase history (?limit=)
//! GET  /api/points/transactions     - Points ledger (?limit=)
//! POST /api/points/purchase         - Buy a virtual card
//! GET  /api/points/notification     - Poll the LINE notification
//! DELETE /api/points/notification   - Cancel the LINE notification
//!
//! # Cart
//! GET  /api/cart                    - Cart and totals
//! POST /api/cart/add                - Add a card
//! POST /api/cart/update             - Change a quantity (0 removes)
//! POST /api/cart/remove             - Remove a card
//! POST /api/cart/clear              - Empty the cart
//! POST /api/cart/checkout           - Buy the cart, returns confirmation redirect
//!
//! # Sales portal
//! POST /api/sales/auth              - Exchange LINE login for a store credential
//! GET  /api/sales/me                - Cached store credential
//! POST /api/sales/logout            - Forget the credential
//! ```

pub mod cart;
pub mod checkout;
pub mod points;
pub mod sales;
pub mod session;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::liff::ClientDirective;
use crate::state::AppState;

/// Success envelope, shaped like the backend's.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Wrap data in a success envelope.
pub const fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// A JSON body plus the SDK directives produced while serving it.
#[derive(Debug, Serialize)]
pub struct WithDirectives<T> {
    #[serde(flatten)]
    pub body: T,
    pub directives: Vec<ClientDirective>,
}

impl<T> WithDirectives<T> {
    #[must_use]
    pub const fn new(body: T, directives: Vec<ClientDirective>) -> Self {
        Self { body, directives }
    }
}

/// Create the session routes router.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(session::show))
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
}

/// Create the points API routes router.
pub fn points_routes() -> Router<AppState> {
    Router::new()
        .route("/catalog", get(points::catalog))
        .route("/balance", get(points::balance))
        .route("/history", get(points::history))
        .route("/transactions", get(points::transactions))
        .route("/purchase", post(points::purchase))
        .route(
            "/notification",
            get(points::notification_status).delete(points::cancel_notification),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/checkout", post(cart::checkout))
}

/// Create the sales portal routes router.
pub fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/auth", post(sales::authenticate))
        .route("/me", get(sales::me))
        .route("/logout", post(sales::logout))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/points", get(points::index))
        .route("/checkout/confirmation", get(checkout::confirmation))
        .nest("/api/session", session_routes())
        .nest("/api/points", points_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/sales", sales_routes())
}

//! Cart route handlers.
//!
//! The cart lives in the browser session (`bakeryCart`). Editing it needs no
//! LINE login; checkout does, and re-reads every price from the catalog.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{error, info, instrument, warn};

use bakery_points_core::{PaymentMethod, VirtualCardProductId};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::LiffPage;
use crate::models::{Cart, CartTotals};
use crate::routes::WithDirectives;
use crate::services::points::UNAVAILABLE_MESSAGE;
use crate::services::{CartService, CheckoutOutcome};
use crate::state::AppState;
use crate::storage::LocalStore;

/// Cart plus its totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub cart: Cart,
    pub totals: CartTotals,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            totals: cart.totals(),
            cart,
        }
    }
}

/// Add to cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartForm {
    pub product_id: VirtualCardProductId,
    pub quantity: Option<u32>,
}

/// Update cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartForm {
    pub product_id: VirtualCardProductId,
    pub quantity: u32,
}

/// Remove from cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromCartForm {
    pub product_id: VirtualCardProductId,
}

/// Checkout body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutForm {
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

fn carts(session: Session) -> CartService {
    let store: Arc<dyn LocalStore> = Arc::new(session);
    CartService::new(store)
}

/// Show the cart.
#[instrument(skip_all)]
pub async fn show(session: Session) -> Json<CartView> {
    Json(carts(session).load().await.into())
}

/// Add a catalog card to the cart.
#[instrument(skip_all, fields(product_id = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<AddToCartForm>,
) -> Result<Json<CartView>> {
    let catalog = state.backend().virtual_cards().await?;
    let product = catalog
        .into_iter()
        .find(|card| card.id == form.product_id)
        .ok_or_else(|| AppError::NotFound(UNAVAILABLE_MESSAGE.to_string()))?;

    let cart = carts(session)
        .add(&product, form.quantity.unwrap_or(1))
        .await?;
    Ok(Json(cart.into()))
}

/// Change a line's quantity; zero removes the line.
#[instrument(skip_all, fields(product_id = %form.product_id, quantity = form.quantity))]
pub async fn update(session: Session, Json(form): Json<UpdateCartForm>) -> Result<Json<CartView>> {
    let cart = carts(session)
        .update_quantity(form.product_id, form.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// Remove a line.
#[instrument(skip_all, fields(product_id = %form.product_id))]
pub async fn remove(
    session: Session,
    Json(form): Json<RemoveFromCartForm>,
) -> Result<Json<CartView>> {
    let cart = carts(session).remove(form.product_id).await?;
    Ok(Json(cart.into()))
}

/// Empty the cart.
#[instrument(skip_all)]
pub async fn clear(session: Session) -> Json<CartView> {
    carts(session).clear().await;
    Json(Cart::default().into())
}

const fn checkout_status(outcome: &CheckoutOutcome) -> StatusCode {
    match outcome {
        CheckoutOutcome::Completed { .. } | CheckoutOutcome::PartiallyCompleted { .. } => {
            StatusCode::OK
        }
        CheckoutOutcome::Busy { .. } => StatusCode::CONFLICT,
        CheckoutOutcome::LoginRequired { .. } => StatusCode::UNAUTHORIZED,
        CheckoutOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Buy everything in the cart.
///
/// A completed checkout empties the cart and answers with the confirmation
/// page redirect. When the backend stops a checkout partway, the units it
/// already charged are taken out of the cart so a retry cannot buy them again.
#[instrument(skip_all, fields(payment_method = %form.payment_method))]
pub async fn checkout(
    State(state): State<AppState>,
    page: LiffPage,
    Json(form): Json<CheckoutForm>,
) -> Result<Response> {
    let flow = state.purchase_flow(&page.page_key().await?).await;
    let carts = CartService::new(Arc::clone(&page.store));
    let cart = carts.load().await;

    let outcome = flow
        .checkout(&page.context, &cart, form.payment_method, &page.user_agent)
        .await;

    match &outcome {
        CheckoutOutcome::Completed { confirmation, .. } => {
            carts.clear().await;
            let item_count = confirmation.item_count.to_string();
            add_breadcrumb(
                "cart",
                "Checkout completed",
                Some(&[("item_count", item_count.as_str())]),
            );
            info!(item_count = confirmation.item_count, "Cart checked out");
        }
        CheckoutOutcome::PartiallyCompleted {
            confirmation,
            purchased,
            ..
        } => {
            if let Err(e) = carts.remove_purchased(purchased).await {
                error!(error = %e, "Failed to remove charged units from cart");
            }
            let item_count = confirmation.item_count.to_string();
            add_breadcrumb(
                "cart",
                "Checkout partially completed",
                Some(&[("item_count", item_count.as_str())]),
            );
            warn!(item_count = confirmation.item_count, "Cart partially checked out");
        }
        _ => {}
    }

    let status = checkout_status(&outcome);
    Ok((status, Json(WithDirectives::new(outcome, page.directives()))).into_response())
}

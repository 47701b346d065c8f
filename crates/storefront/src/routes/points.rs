//! Points page and points API handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use bakery_points_core::{PaymentMethod, UserId, VirtualCardProductId};

use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::liff::ClientDirective;
use crate::middleware::{LiffPage, page_key};
use crate::models::{
    PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct,
};
use crate::routes::{ApiResponse, WithDirectives, ok};
use crate::services::{IdentityError, NotificationStatus, PurchaseOutcome, PurchaseRequest};
use crate::state::AppState;

/// Catalog card display data for templates.
#[derive(Debug, Clone)]
pub struct CardView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub points: i64,
    pub purchasable: bool,
}

impl From<&VirtualCardProduct> for CardView {
    fn from(card: &VirtualCardProduct) -> Self {
        Self {
            id: card.id.as_i64(),
            name: card.name.clone(),
            description: card.description.clone().filter(|d| !d.trim().is_empty()),
            price: card.price.display(),
            points: card.points_value,
            purchasable: card.is_purchasable(),
        }
    }
}

/// Purchase history row display data for templates.
#[derive(Debug, Clone)]
pub struct HistoryView {
    pub product_name: String,
    pub amount: Option<String>,
    pub points: Option<i64>,
    pub payment: Option<&'static str>,
    pub date: Option<String>,
}

impl From<&PurchaseRecord> for HistoryView {
    fn from(record: &PurchaseRecord) -> Self {
        Self {
            product_name: record
                .product_name
                .clone()
                .unwrap_or_else(|| "點數卡".to_string()),
            amount: record.amount.map(|amount| amount.display()),
            points: record.points_added,
            payment: record.payment_method.map(PaymentMethod::label),
            date: record
                .created_at
                .map(|at| at.format("%Y/%m/%d %H:%M").to_string()),
        }
    }
}

/// Payment method option for templates.
#[derive(Debug, Clone, Copy)]
pub struct PaymentOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Points page template.
#[derive(Template, WebTemplate)]
#[template(path = "points/index.html")]
pub struct PointsPageTemplate {
    pub liff_id: String,
    pub logged_in: bool,
    pub display_name: Option<String>,
    pub balance: Option<i64>,
    pub cards: Vec<CardView>,
    pub history: Vec<HistoryView>,
    pub payment_methods: Vec<PaymentOption>,
    pub error: Option<String>,
}

/// `?limit=` for history endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

/// Purchase request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseForm {
    pub product_id: VirtualCardProductId,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Purchase outcome plus the notification it started, if any.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseView {
    #[serde(flatten)]
    pub outcome: PurchaseOutcome,
    pub notification: Option<NotificationStatus>,
}

/// Notification progress as polled by the page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub notification: NotificationStatus,
    pub directives: Vec<ClientDirective>,
}

/// The internal user id of the logged-in page, from the customer record
/// resolved when the page was opened.
fn current_user_id(page: &LiffPage) -> std::result::Result<UserId, IdentityError> {
    if !page.context.is_logged_in() {
        return Err(IdentityError::NotLoggedIn);
    }
    match (page.context.customer(), page.context.profile()) {
        (Some(customer), _) => Ok(customer.id),
        (None, Some(profile)) => Err(IdentityError::CustomerNotFound(profile.user_id)),
        (None, None) => Err(IdentityError::NotLoggedIn),
    }
}

/// Display the points page.
#[instrument(skip_all)]
pub async fn index(State(state): State<AppState>, page: LiffPage) -> Result<PointsPageTemplate> {
    let flow = state.purchase_flow(&page.page_key().await?).await;
    let mut error = page.context.customer_error();

    let cards = match flow.load_catalog().await {
        Ok(catalog) => catalog.iter().map(CardView::from).collect(),
        Err(e) => {
            warn!(error = %e, "Failed to load virtual card catalog");
            error = Some(e.user_message());
            Vec::new()
        }
    };

    let (balance, history) = match current_user_id(&page) {
        Ok(user_id) => {
            let (balance, history) = tokio::join!(
                flow.refresh_balance(user_id),
                flow.purchase_history(user_id, None),
            );
            let balance = match balance {
                Ok(balance) => Some(balance.available_points),
                Err(e) => {
                    warn!(error = %e, "Failed to load points balance");
                    error = Some(e.user_message());
                    None
                }
            };
            let history = history
                .inspect_err(|e| warn!(error = %e, "Failed to load purchase history"))
                .unwrap_or_default();
            (balance, history.iter().map(HistoryView::from).collect())
        }
        Err(IdentityError::NotLoggedIn) => (None, Vec::new()),
        Err(e) => {
            error = error.or_else(|| Some(e.user_message()));
            (None, Vec::new())
        }
    };

    Ok(PointsPageTemplate {
        liff_id: state.config().line.liff_id.clone(),
        logged_in: page.context.is_logged_in(),
        display_name: page.context.profile().map(|p| p.display_name),
        balance,
        cards,
        history,
        payment_methods: PaymentMethod::ALL
            .iter()
            .map(|m| PaymentOption {
                value: m.as_str(),
                label: m.label(),
            })
            .collect(),
        error,
    })
}

/// Virtual card catalog. Does not require login.
#[instrument(skip_all)]
pub async fn catalog(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<ApiResponse<Vec<VirtualCardProduct>>>> {
    let flow = state.purchase_flow(&page_key(&session).await?).await;
    Ok(ok(flow.load_catalog().await?))
}

/// Current points balance.
#[instrument(skip_all)]
pub async fn balance(
    State(state): State<AppState>,
    page: LiffPage,
) -> Result<Json<ApiResponse<PointsBalance>>> {
    let user_id = current_user_id(&page)?;
    let flow = state.purchase_flow(&page.page_key().await?).await;
    Ok(ok(flow.refresh_balance(user_id).await?))
}

/// Most recent virtual card purchases.
#[instrument(skip_all)]
pub async fn history(
    State(state): State<AppState>,
    page: LiffPage,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<PurchaseRecord>>>> {
    let user_id = current_user_id(&page)?;
    let flow = state.purchase_flow(&page.page_key().await?).await;
    Ok(ok(flow.purchase_history(user_id, query.limit).await?))
}

/// Most recent points ledger entries.
#[instrument(skip_all)]
pub async fn transactions(
    State(state): State<AppState>,
    page: LiffPage,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<PointsTransaction>>>> {
    let profile = page
        .context
        .profile()
        .filter(|_| page.context.is_logged_in())
        .ok_or(IdentityError::NotLoggedIn)?;
    let flow = state.purchase_flow(&page.page_key().await?).await;
    Ok(ok(flow.transactions(&profile.user_id, query.limit).await?))
}

const fn outcome_status(outcome: &PurchaseOutcome) -> StatusCode {
    match outcome {
        PurchaseOutcome::Completed { .. } => StatusCode::OK,
        PurchaseOutcome::Busy { .. } => StatusCode::CONFLICT,
        PurchaseOutcome::NotConfirmed => StatusCode::BAD_REQUEST,
        PurchaseOutcome::LoginRequired { .. } => StatusCode::UNAUTHORIZED,
        PurchaseOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Buy one virtual card.
///
/// Inside the LINE app a completed purchase starts the notification
/// countdown; its progress is polled from `/api/points/notification`.
#[instrument(skip_all, fields(product_id = %form.product_id))]
pub async fn purchase(
    State(state): State<AppState>,
    page: LiffPage,
    Json(form): Json<PurchaseForm>,
) -> Result<Response> {
    let key = page.page_key().await?;
    let flow = state.purchase_flow(&key).await;

    let request = PurchaseRequest {
        product_id: form.product_id,
        payment_method: form.payment_method,
        confirmed: form.confirmed,
        user_agent: page.user_agent.clone(),
        notes: form.notes.unwrap_or_default(),
    };
    let outcome = flow.purchase(&page.context, request).await;

    let mut notification = None;
    if let PurchaseOutcome::Completed {
        receipt: Some(receipt),
        ..
    } = &outcome
    {
        let product_id = form.product_id.to_string();
        add_breadcrumb(
            "points",
            "Virtual card purchased",
            Some(&[("product_id", product_id.as_str())]),
        );
        if let Some(sdk) = page.context.sdk().filter(|sdk| sdk.is_in_client()) {
            let notifier = state.replace_notification(&key).await;
            notifier.spawn(sdk, receipt.messages());
            info!("Purchase notification scheduled");
            notification = Some(notifier.status());
        }
    }

    let status = outcome_status(&outcome);
    let body = WithDirectives::new(
        PurchaseView {
            outcome,
            notification,
        },
        page.directives(),
    );
    Ok((status, Json(body)).into_response())
}

/// Progress of the page's purchase notification.
#[instrument(skip_all)]
pub async fn notification_status(
    State(state): State<AppState>,
    session: Session,
) -> Json<NotificationView> {
    let flow = match session.id() {
        Some(id) => state.notification(&id.to_string()).await,
        None => None,
    };
    Json(match flow {
        Some(flow) => NotificationView {
            notification: flow.status(),
            directives: flow.take_directives(),
        },
        None => NotificationView {
            notification: NotificationStatus::Idle,
            directives: Vec::new(),
        },
    })
}

/// Cancel the page's purchase notification (page torn down).
#[instrument(skip_all)]
pub async fn cancel_notification(
    State(state): State<AppState>,
    session: Session,
) -> Json<NotificationView> {
    let cancelled = match session.id() {
        Some(id) => state.cancel_notification(&id.to_string()).await,
        None => None,
    };
    if cancelled.is_some() {
        info!("Purchase notification cancelled");
    }
    Json(NotificationView {
        notification: cancelled.map_or(NotificationStatus::Idle, |flow| flow.status()),
        directives: Vec::new(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bakery_points_core::{Price, PurchaseId, VirtualCardStatus};

    use super::*;

    #[test]
    fn test_card_view_formats_price() {
        let card = VirtualCardProduct {
            id: VirtualCardProductId::new(3),
            name: "儲值卡 1000".to_string(),
            description: Some("  ".to_string()),
            price: Price::from_dollars(1000),
            points_value: 1100,
            image_url: None,
            status: VirtualCardStatus::Inactive,
        };
        let view = CardView::from(&card);
        assert_eq!(view.price, "NT$1,000");
        assert!(view.description.is_none());
        assert!(!view.purchasable);
    }

    #[test]
    fn test_history_view_defaults() {
        let record = PurchaseRecord {
            id: PurchaseId::new(1),
            virtual_card_product_id: None,
            product_name: None,
            amount: None,
            points_added: Some(520),
            payment_method: Some(PaymentMethod::Cash),
            status: None,
            created_at: None,
        };
        let view = HistoryView::from(&record);
        assert_eq!(view.product_name, "點數卡");
        assert_eq!(view.payment, Some("現金"));
    }

    #[test]
    fn test_purchase_form_defaults() {
        let form: PurchaseForm = serde_json::from_str(r#"{"productId": 4}"#).unwrap();
        assert_eq!(form.payment_method, PaymentMethod::LinePay);
        assert!(!form.confirmed);
    }

    #[test]
    fn test_outcome_status_mapping() {
        assert_eq!(
            outcome_status(&PurchaseOutcome::NotConfirmed),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            outcome_status(&PurchaseOutcome::Rejected {
                message: "點數卡已售完".to_string()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}

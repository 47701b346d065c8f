//! Checkout confirmation page.
//!
//! Reached by redirect after a cart checkout. Everything shown comes from the
//! query string; a missing or malformed `type` or total renders the invalid
//! view with a link back to `/points`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::RawQuery,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use crate::filters;
use crate::services::{ConfirmationKind, ConfirmationParams};

/// Confirmation page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/confirmation.html")]
pub struct ConfirmationTemplate {
    pub is_virtual_card: bool,
    pub total_amount: String,
    pub total_points: i64,
    pub item_count: u32,
    pub payment_label: Option<&'static str>,
    pub order_number: Option<String>,
}

impl From<&ConfirmationParams> for ConfirmationTemplate {
    fn from(params: &ConfirmationParams) -> Self {
        Self {
            is_virtual_card: params.kind == ConfirmationKind::VirtualCard,
            total_amount: params.total_amount.display(),
            total_points: params.total_points,
            item_count: params.item_count,
            payment_label: params.payment_method.map(|m| m.label()),
            order_number: params.order_number.clone(),
        }
    }
}

/// "Page parameters invalid" template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/invalid.html")]
pub struct InvalidConfirmationTemplate {
    pub reason: String,
}

/// Display the confirmation page.
#[instrument(skip_all)]
pub async fn confirmation(RawQuery(query): RawQuery) -> Response {
    let query = query.unwrap_or_default();
    let pairs: Vec<_> = url::form_urlencoded::parse(query.as_bytes()).collect();

    match ConfirmationParams::from_pairs(pairs.iter().map(|(k, v)| (&**k, &**v))) {
        Ok(params) => ConfirmationTemplate::from(&params).into_response(),
        Err(e) => {
            info!(error = %e, "Invalid confirmation page parameters");
            (
                StatusCode::BAD_REQUEST,
                InvalidConfirmationTemplate {
                    reason: e.to_string(),
                },
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bakery_points_core::{PaymentMethod, Price};

    use super::*;

    #[test]
    fn test_template_from_params() {
        let params = ConfirmationParams {
            kind: ConfirmationKind::VirtualCard,
            total_amount: Price::from_dollars(1500),
            total_points: 1650,
            item_count: 2,
            payment_method: Some(PaymentMethod::CreditCard),
            order_number: Some("VC20250101001".to_string()),
        };
        let page = ConfirmationTemplate::from(&params);
        assert!(page.is_virtual_card);
        assert_eq!(page.total_amount, "NT$1,500");
        assert_eq!(page.payment_label, Some("信用卡"));

        let html = page.render().unwrap();
        assert!(html.contains("NT$1,500"));
        assert!(html.contains("1,650 點"));
        assert!(html.contains("VC20250101001"));
    }

    #[tokio::test]
    async fn test_missing_type_renders_invalid_view() {
        let response = confirmation(RawQuery(Some("totalAmount=100".to_string()))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_query_renders_page() {
        let query = "type=order&totalAmount=320&itemCount=1&paymentMethod=cash";
        let response = confirmation(RawQuery(Some(query.to_string()))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

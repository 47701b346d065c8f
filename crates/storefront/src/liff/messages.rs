//! LINE message payloads.
//!
//! Only the two message types the storefront sends are modelled: plain text
//! and Flex bubbles. See the Messaging API reference for the full schema.

use serde::Serialize;
use serde_json::{Value, json};

use bakery_points_core::{PaymentMethod, Price};

/// Maximum number of messages in one send.
pub const MAX_MESSAGES_PER_SEND: usize = 5;

/// Maximum length of a text message.
pub const MAX_TEXT_LEN: usize = 5000;

/// Maximum length of a Flex message's alternative text.
pub const MAX_ALT_TEXT_LEN: usize = 400;

const BRAND_COLOR: &str = "#B5651D";
const MUTED_COLOR: &str = "#8C8C8C";

/// A message sent to the user's chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineMessage {
    Text {
        text: String,
    },
    Flex {
        #[serde(rename = "altText")]
        alt_text: String,
        contents: Value,
    },
}

impl LineMessage {
    /// Create a text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Check the platform's size limits.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated limit.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Text { text } if text.is_empty() => Err("text message is empty".to_string()),
            Self::Text { text } if text.chars().count() > MAX_TEXT_LEN => {
                Err(format!("text message exceeds {MAX_TEXT_LEN} characters"))
            }
            Self::Flex { alt_text, .. } if alt_text.chars().count() > MAX_ALT_TEXT_LEN => {
                Err(format!("altText exceeds {MAX_ALT_TEXT_LEN} characters"))
            }
            _ => Ok(()),
        }
    }
}

/// Validate a batch of messages before sending.
///
/// # Errors
///
/// Returns a description of the first problem found.
pub fn validate_batch(messages: &[LineMessage]) -> Result<(), String> {
    if messages.is_empty() {
        return Err("no messages to send".to_string());
    }
    if messages.len() > MAX_MESSAGES_PER_SEND {
        return Err(format!(
            "at most {MAX_MESSAGES_PER_SEND} messages per send (got {})",
            messages.len()
        ));
    }
    messages.iter().try_for_each(LineMessage::validate)
}

/// Details of a completed virtual card purchase, as shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub product_name: String,
    pub amount: Price,
    pub points_added: i64,
    /// Balance after the purchase; `None` when the refresh failed.
    pub balance: Option<i64>,
    pub payment_method: PaymentMethod,
    pub order_number: Option<String>,
}

impl PurchaseReceipt {
    /// Messages announcing the purchase: a short text and a Flex receipt.
    #[must_use]
    pub fn messages(&self) -> Vec<LineMessage> {
        let text = match self.balance {
            Some(balance) => format!(
                "感謝您購買「{}」！已為您加值 {} 點，目前可用點數 {} 點。",
                self.product_name, self.points_added, balance
            ),
            None => format!(
                "感謝您購買「{}」！已為您加值 {} 點。",
                self.product_name, self.points_added
            ),
        };
        vec![
            LineMessage::text(text),
            LineMessage::Flex {
                alt_text: format!("點數卡購買成功：{}", self.product_name),
                contents: self.bubble(),
            },
        ]
    }

    fn bubble(&self) -> Value {
        let mut rows = vec![
            row("商品", &self.product_name),
            row("金額", &self.amount.display()),
            row("付款方式", self.payment_method.label()),
            row("加值點數", &format!("+{}", self.points_added)),
        ];
        if let Some(balance) = self.balance {
            rows.push(row("目前點數", &balance.to_string()));
        }
        if let Some(order_number) = &self.order_number {
            rows.push(row("訂單編號", order_number));
        }

        json!({
            "type": "bubble",
            "header": {
                "type": "box",
                "layout": "vertical",
                "contents": [{
                    "type": "text",
                    "text": "購買成功",
                    "weight": "bold",
                    "size": "lg",
                    "color": BRAND_COLOR
                }]
            },
            "body": {
                "type": "box",
                "layout": "vertical",
                "spacing": "sm",
                "contents": rows
            }
        })
    }
}

fn row(label: &str, value: &str) -> Value {
    json!({
        "type": "box",
        "layout": "horizontal",
        "contents": [
            {"type": "text", "text": label, "size": "sm", "color": MUTED_COLOR, "flex": 2},
            {"type": "text", "text": value, "size": "sm", "align": "end", "flex": 3, "wrap": true}
        ]
    })
}

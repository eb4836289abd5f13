use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a payment. `Pending` is the initial state; the two others
/// are terminal and a row never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

/// Which rail the payment was issued on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Stars,
    Card,
    Sbp,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Stars => "stars",
            PaymentMethod::Card => "card",
            PaymentMethod::Sbp => "sbp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    /// Charge in whole stars; zero on the gateway rail.
    pub stars: i64,
    /// Charge in RUB; zero on the stars rail.
    pub amount_rub: f64,
    pub status: PaymentStatus,
    pub panel_uuid: Option<String>,
    /// Serialized [`InvoicePayload`]; the globally unique idempotency key.
    pub payload: String,
    pub subscription_days: i64,
    pub promo_code: Option<String>,
    pub method: String,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Context embedded in the invoice payload so the reconciler can recover
/// `{user, duration, promo, bonus}` without a prior lookup. The nonce makes
/// the payload unique even when a user repeats an identical purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub user_id: i64,
    pub months: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub bonus_days: i64,
    pub nonce: String,
}

impl InvoicePayload {
    pub fn new(user_id: i64, months: i64, promo_code: Option<String>, bonus_days: i64) -> Self {
        Self {
            user_id,
            months,
            promo_code,
            bonus_days,
            nonce: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn encode(&self) -> String {
        // A struct of scalars cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

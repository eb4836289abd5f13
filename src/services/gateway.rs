use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

const YOOKASSA_API: &str = "https://api.yookassa.ru/v3";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("gateway returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMethod {
    Card,
    Sbp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
}

impl GatewayStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "succeeded" => GatewayStatus::Succeeded,
            "canceled" => GatewayStatus::Canceled,
            "waiting_for_capture" => GatewayStatus::WaitingForCapture,
            _ => GatewayStatus::Pending,
        }
    }
}

/// A payment as the gateway sees it. `confirmation_url` carries the card
/// redirect or the SBP QR link depending on the method used.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub id: String,
    pub status: GatewayStatus,
    pub confirmation_url: Option<String>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn create_payment(
        &self,
        amount_rub: f64,
        description: &str,
        method: GatewayMethod,
        idempotence_key: &str,
    ) -> Result<GatewayPayment, GatewayError>;

    async fn payment_status(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
}

#[derive(Clone)]
pub struct YookassaClient {
    client: reqwest::Client,
    shop_id: String,
    secret_key: String,
    return_url: String,
}

impl YookassaClient {
    pub fn new(shop_id: String, secret_key: String, return_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            shop_id,
            secret_key,
            return_url,
        }
    }

    fn parse_payment(value: Value) -> Result<GatewayPayment, GatewayError> {
        #[derive(Deserialize)]
        struct Confirmation {
            confirmation_url: Option<String>,
        }
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            status: String,
            confirmation: Option<Confirmation>,
        }

        let raw: Raw =
            serde_json::from_value(value).map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(GatewayPayment {
            id: raw.id,
            status: GatewayStatus::parse(&raw.status),
            confirmation_url: raw.confirmation.and_then(|c| c.confirmation_url),
        })
    }
}

#[async_trait]
impl Gateway for YookassaClient {
    async fn create_payment(
        &self,
        amount_rub: f64,
        description: &str,
        method: GatewayMethod,
        idempotence_key: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        let confirmation = match method {
            GatewayMethod::Card => json!({
                "type": "redirect",
                "return_url": self.return_url,
            }),
            GatewayMethod::Sbp => json!({ "type": "qr" }),
        };
        let mut body = json!({
            "amount": {
                "value": format!("{amount_rub:.2}"),
                "currency": "RUB",
            },
            "capture": true,
            "confirmation": confirmation,
            "description": description,
        });
        if matches!(method, GatewayMethod::Sbp) {
            body["payment_method_data"] = json!({ "type": "sbp" });
        }

        let resp = self
            .client
            .post(format!("{YOOKASSA_API}/payments"))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotence_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, "gateway rejected payment creation");
            return Err(GatewayError::Status(status));
        }
        Self::parse_payment(resp.json().await?)
    }

    async fn payment_status(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let resp = self
            .client
            .get(format!("{YOOKASSA_API}/payments/{payment_id}"))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }
        Self::parse_payment(resp.json().await?)
    }
}

/// Stands in when YooKassa credentials are absent; every call reports the
/// gateway as unavailable so the rail vanishes from the purchase flow.
pub struct DisabledGateway;

#[async_trait]
impl Gateway for DisabledGateway {
    async fn create_payment(
        &self,
        _amount_rub: f64,
        _description: &str,
        _method: GatewayMethod,
        _idempotence_key: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn payment_status(&self, _payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

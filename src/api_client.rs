use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("panel resource not found")]
    NotFound,
    #[error("panel rejected credentials")]
    Unauthorized,
    #[error("panel returned status {0}")]
    Status(StatusCode),
    #[error("panel request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected panel response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelAccount {
    pub uuid: String,
    #[serde(rename = "expireAt")]
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(rename = "subscriptionUrl", default)]
    pub subscription_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub username: String,
    #[serde(rename = "telegramId")]
    pub telegram_id: i64,
    #[serde(rename = "expireAt")]
    pub expire_at: DateTime<Utc>,
    #[serde(rename = "activeInternalSquads", skip_serializing_if = "Vec::is_empty")]
    pub internal_squads: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PanelStats {
    #[serde(rename = "onlineNow", default)]
    pub online_now: i64,
    #[serde(rename = "totalUsers", default)]
    pub total_users: i64,
    #[serde(rename = "activeConnections", default)]
    pub active_connections: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelNode {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "isConnected", default)]
    pub is_connected: bool,
    #[serde(rename = "isDisabled", default)]
    pub is_disabled: bool,
}

/// Seam between the bot and the remote panel, mockable in tests.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn health(&self) -> Result<(), ApiError>;
    async fn account_by_telegram_id(&self, telegram_id: i64)
        -> Result<Option<PanelAccount>, ApiError>;
    async fn account_by_uuid(&self, uuid: &str) -> Result<PanelAccount, ApiError>;
    async fn create_account(&self, new: &NewAccount) -> Result<PanelAccount, ApiError>;
    async fn set_expiry(&self, uuid: &str, expire_at: DateTime<Utc>)
        -> Result<PanelAccount, ApiError>;
    async fn subscription_link(&self, uuid: &str) -> Result<Option<String>, ApiError>;
    async fn stats(&self) -> Result<PanelStats, ApiError>;
    async fn nodes(&self) -> Result<Vec<PanelNode>, ApiError>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: String, token: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// One request with retry on transport errors and 5xx. Auth failures and
    /// 404 are definitive and never retried.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}/api{}", self.base_url, path);
        let mut last_err: Option<ApiError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
            }
            let mut req = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.token);
            if let Some(body) = &body {
                req = req.json(body);
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(attempt, %url, error = %err, "panel request failed, retrying");
                    last_err = Some(ApiError::Transport(err));
                    continue;
                }
            };

            match resp.status() {
                StatusCode::NOT_FOUND => return Err(ApiError::NotFound),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(ApiError::Unauthorized);
                }
                status if status.is_server_error() => {
                    warn!(attempt, %url, %status, "panel returned server error, retrying");
                    last_err = Some(ApiError::Status(status));
                    continue;
                }
                status if !status.is_success() => return Err(ApiError::Status(status)),
                _ => {}
            }

            // Panel wraps every payload in a {"response": ...} envelope.
            let envelope: Value = resp.json().await?;
            let payload = envelope.get("response").cloned().unwrap_or(envelope);
            return serde_json::from_value(payload)
                .map_err(|err| ApiError::Decode(err.to_string()));
        }

        Err(last_err.unwrap_or(ApiError::Status(StatusCode::BAD_GATEWAY)))
    }
}

#[async_trait]
impl Provisioner for ApiClient {
    async fn health(&self) -> Result<(), ApiError> {
        self.request::<Value>(Method::GET, "/system/stats", None)
            .await?;
        Ok(())
    }

    async fn account_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<PanelAccount>, ApiError> {
        let path = format!("/users/by-telegram-id/{telegram_id}");
        match self.request::<Vec<PanelAccount>>(Method::GET, &path, None).await {
            Ok(accounts) => Ok(accounts.into_iter().next()),
            Err(ApiError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn account_by_uuid(&self, uuid: &str) -> Result<PanelAccount, ApiError> {
        self.request(Method::GET, &format!("/users/{uuid}"), None)
            .await
    }

    async fn create_account(&self, new: &NewAccount) -> Result<PanelAccount, ApiError> {
        let body = serde_json::to_value(new).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.request(Method::POST, "/users", Some(body)).await
    }

    async fn set_expiry(
        &self,
        uuid: &str,
        expire_at: DateTime<Utc>,
    ) -> Result<PanelAccount, ApiError> {
        let body = serde_json::json!({
            "uuid": uuid,
            "expireAt": expire_at.to_rfc3339(),
        });
        self.request(Method::PATCH, "/users", Some(body)).await
    }

    async fn subscription_link(&self, uuid: &str) -> Result<Option<String>, ApiError> {
        let account = self.account_by_uuid(uuid).await?;
        Ok(account.subscription_url)
    }

    async fn stats(&self) -> Result<PanelStats, ApiError> {
        self.request(Method::GET, "/system/stats", None).await
    }

    async fn nodes(&self) -> Result<Vec<PanelNode>, ApiError> {
        self.request(Method::GET, "/nodes", None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unwrap_and_passthrough() {
        let wrapped: Value =
            serde_json::from_str(r#"{"response":{"uuid":"u1","expireAt":null}}"#).unwrap();
        let payload = wrapped.get("response").cloned().unwrap_or(wrapped);
        let account: PanelAccount = serde_json::from_value(payload).unwrap();
        assert_eq!(account.uuid, "u1");

        let bare: Value = serde_json::from_str(r#"{"uuid":"u2","expireAt":null}"#).unwrap();
        let payload = bare.get("response").cloned().unwrap_or(bare);
        let account: PanelAccount = serde_json::from_value(payload).unwrap();
        assert_eq!(account.uuid, "u2");
    }

    #[test]
    fn account_dates_decode() {
        let account: PanelAccount = serde_json::from_str(
            r#"{"uuid":"u","expireAt":"2026-03-01T12:00:00Z","subscriptionUrl":"https://sub/x"}"#,
        )
        .unwrap();
        assert!(account.expire_at.is_some());
        assert_eq!(account.subscription_url.as_deref(), Some("https://sub/x"));
    }
}

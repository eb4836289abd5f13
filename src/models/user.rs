use chrono::{DateTime, Utc};

/// A bot user. Created on first interaction, never deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BotUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub language: String,
    pub registered_at: DateTime<Utc>,
    pub trial_used: bool,
    /// Set at most once, first-write-wins.
    pub referrer_id: Option<i64>,
    /// Panel account uuid, linked once the first provisioning succeeds.
    pub panel_uuid: Option<String>,
    pub auto_renewal: bool,
    pub last_renewal_notification: Option<DateTime<Utc>>,
}

impl BotUser {
    /// Display name used when creating the panel account.
    pub fn panel_username(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("user_{}", self.telegram_id))
    }
}

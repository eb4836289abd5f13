use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PromoCode {
    pub code: String,
    pub discount_percent: i64,
    pub bonus_days: i64,
    pub max_uses: i64,
    pub current_uses: i64,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// `max_uses` of zero means unlimited.
    pub fn is_exhausted(&self) -> bool {
        self.max_uses > 0 && self.current_uses >= self.max_uses
    }
}

/// Validation failure reasons, surfaced to the user verbatim by locale key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoRejection {
    NotFound,
    Expired,
    Exhausted,
    AlreadyUsed,
}

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Referral {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_id: i64,
    pub bonus_days: i64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate shown on the referral screen.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferralSummary {
    pub invited: i64,
    pub bonus_days: i64,
}

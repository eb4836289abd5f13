use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::referral::ReferralSummary;

#[derive(Debug, Clone)]
pub struct ReferralRepository {
    pool: SqlitePool,
}

impl ReferralRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn bonus_granted(&self, referrer_id: i64, referred_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = ? AND referred_id = ?",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check referral bonus")?;
        Ok(count > 0)
    }

    /// Records the grant. Returns false when the pair already exists, so a
    /// replay after a partial failure stays a single bonus.
    pub async fn grant(&self, referrer_id: i64, referred_id: i64, bonus_days: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO referrals (referrer_id, referred_id, bonus_days, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .bind(bonus_days)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to record referral bonus")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn summary_for(&self, referrer_id: i64) -> Result<ReferralSummary> {
        let row: (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), SUM(bonus_days) FROM referrals WHERE referrer_id = ?",
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch referral summary")?;
        Ok(ReferralSummary {
            invited: row.0,
            bonus_days: row.1.unwrap_or(0),
        })
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::promo::{PromoCode, PromoRejection};

/// Result of trying to burn one use of a code for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    Recorded,
    /// The (code, user) pair already exists; nothing was changed.
    AlreadyRecorded,
    /// A concurrent user took the last slot between validation and commit.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct PromoRepository {
    pool: SqlitePool,
}

impl PromoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        code: &str,
        discount_percent: i64,
        bonus_days: i64,
        max_uses: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO promo_codes (code, discount_percent, bonus_days, max_uses, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(code)
        .bind(discount_percent)
        .bind(bonus_days)
        .bind(max_uses)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to create promo code")?;
        Ok(())
    }

    pub async fn set_active(&self, code: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE promo_codes SET is_active = ? WHERE code = ?")
            .bind(active)
            .bind(code)
            .execute(&self.pool)
            .await
            .context("Failed to toggle promo code")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, code: &str) -> Result<Option<PromoCode>> {
        let promo = sqlx::query_as::<_, PromoCode>("SELECT * FROM promo_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch promo code")?;
        Ok(promo)
    }

    /// Read-only validation for the purchase flow. Advisory: another user can
    /// still take the last slot before `record_usage` runs.
    pub async fn can_use(
        &self,
        code: &str,
        user_id: i64,
    ) -> Result<std::result::Result<PromoCode, PromoRejection>> {
        let Some(promo) = self.get(code).await? else {
            return Ok(Err(PromoRejection::NotFound));
        };
        if !promo.is_active {
            return Ok(Err(PromoRejection::NotFound));
        }
        if promo.is_expired(Utc::now()) {
            return Ok(Err(PromoRejection::Expired));
        }
        if promo.is_exhausted() {
            return Ok(Err(PromoRejection::Exhausted));
        }
        let used: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promo_code_usage WHERE code = ? AND user_id = ?",
        )
        .bind(code)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check promo usage")?;
        if used > 0 {
            return Ok(Err(PromoRejection::AlreadyUsed));
        }
        Ok(Ok(promo))
    }

    /// Burns one use inside a transaction. The UNIQUE(code, user_id) constraint
    /// makes a replay a no-op instead of a double count.
    pub async fn record_usage(&self, code: &str, user_id: i64) -> Result<UsageOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin tx")?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO promo_code_usage (code, user_id, used_at) VALUES (?, ?, ?)",
        )
        .bind(code)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to record promo usage")?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Ok(UsageOutcome::AlreadyRecorded);
        }

        let counted = sqlx::query(
            "UPDATE promo_codes SET current_uses = current_uses + 1 \
             WHERE code = ? AND (max_uses = 0 OR current_uses < max_uses)",
        )
        .bind(code)
        .execute(&mut *tx)
        .await
        .context("Failed to increment promo counter")?;

        if counted.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back usage")?;
            return Ok(UsageOutcome::Exhausted);
        }

        tx.commit().await.context("Failed to commit promo usage")?;
        Ok(UsageOutcome::Recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mem_pool;
    use chrono::Duration;

    async fn repo_with(code: &str, max_uses: i64) -> PromoRepository {
        let repo = PromoRepository::new(mem_pool().await);
        repo.create(code, 10, 0, max_uses, None).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn usage_is_idempotent_per_user() {
        let repo = repo_with("SPRING", 5).await;
        assert_eq!(
            repo.record_usage("SPRING", 1).await.unwrap(),
            UsageOutcome::Recorded
        );
        assert_eq!(
            repo.record_usage("SPRING", 1).await.unwrap(),
            UsageOutcome::AlreadyRecorded
        );
        assert_eq!(repo.get("SPRING").await.unwrap().unwrap().current_uses, 1);
    }

    #[tokio::test]
    async fn counter_stops_at_cap() {
        let repo = repo_with("LAST", 1).await;
        assert_eq!(
            repo.record_usage("LAST", 1).await.unwrap(),
            UsageOutcome::Recorded
        );
        assert_eq!(
            repo.record_usage("LAST", 2).await.unwrap(),
            UsageOutcome::Exhausted
        );
        // The losing user's usage row must not survive the rollback.
        assert!(matches!(
            repo.can_use("LAST", 2).await.unwrap(),
            Err(PromoRejection::Exhausted)
        ));
    }

    #[tokio::test]
    async fn zero_cap_never_exhausts() {
        let repo = repo_with("OPEN", 0).await;
        for user in 1..=3 {
            assert_eq!(
                repo.record_usage("OPEN", user).await.unwrap(),
                UsageOutcome::Recorded
            );
        }
        assert_eq!(repo.get("OPEN").await.unwrap().unwrap().current_uses, 3);
    }

    #[tokio::test]
    async fn validation_rejections() {
        let repo = repo_with("OK", 2).await;
        repo.create("OLD", 5, 0, 10, Some(Utc::now() - Duration::days(1)))
            .await
            .unwrap();

        assert!(matches!(
            repo.can_use("MISSING", 1).await.unwrap(),
            Err(PromoRejection::NotFound)
        ));
        assert!(matches!(
            repo.can_use("OLD", 1).await.unwrap(),
            Err(PromoRejection::Expired)
        ));
        assert!(repo.set_active("OK", false).await.unwrap());
        assert!(matches!(
            repo.can_use("OK", 1).await.unwrap(),
            Err(PromoRejection::NotFound)
        ));
        assert!(repo.set_active("OK", true).await.unwrap());
        repo.record_usage("OK", 1).await.unwrap();
        assert!(matches!(
            repo.can_use("OK", 1).await.unwrap(),
            Err(PromoRejection::AlreadyUsed)
        ));
        assert!(repo.can_use("OK", 2).await.unwrap().is_ok());
    }
}

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::payment::{Payment, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone)]
pub struct NewPayment<'a> {
    pub user_id: i64,
    pub stars: i64,
    pub amount_rub: f64,
    pub payload: &'a str,
    pub subscription_days: i64,
    pub promo_code: Option<&'a str>,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: &SqliteRow) -> Result<Payment> {
        Ok(Payment {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            stars: row.try_get("stars")?,
            amount_rub: row.try_get("amount_rub")?,
            status: PaymentStatus::parse(row.try_get::<String, _>("status")?.as_str()),
            panel_uuid: row.try_get("panel_uuid")?,
            payload: row.try_get("payload")?,
            subscription_days: row.try_get("subscription_days")?,
            promo_code: row.try_get("promo_code")?,
            method: row.try_get("method")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    pub async fn create(&self, new: NewPayment<'_>) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO payments
                (user_id, stars, amount_rub, status, payload, subscription_days, promo_code, method, created_at)
            VALUES (?, ?, ?, 'pending', ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(new.user_id)
        .bind(new.stars)
        .bind(new.amount_rub)
        .bind(new.payload)
        .bind(new.subscription_days)
        .bind(new.promo_code)
        .bind(new.method.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create payment")?;
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment")?;
        row.map(|r| Self::row_to_payment(&r)).transpose()
    }

    pub async fn get_by_payload(&self, payload: &str) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE payload = ?")
            .bind(payload)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment by payload")?;
        row.map(|r| Self::row_to_payment(&r)).transpose()
    }

    pub async fn get_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM payments WHERE gateway_payment_id = ?")
            .bind(gateway_payment_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch payment by gateway ID")?;
        row.map(|r| Self::row_to_payment(&r)).transpose()
    }

    pub async fn set_gateway_id(&self, id: i64, gateway_payment_id: &str) -> Result<()> {
        sqlx::query("UPDATE payments SET gateway_payment_id = ? WHERE id = ?")
            .bind(gateway_payment_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to attach gateway payment ID")?;
        Ok(())
    }

    /// Compare-and-set for settlement. Exactly one caller observes true for a
    /// given row; replays and racing confirmations see false.
    pub async fn complete_if_pending(&self, id: i64, panel_uuid: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'completed', panel_uuid = ?, completed_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(panel_uuid)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to complete payment")?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminal rejection, used only before any external mutation happened.
    pub async fn fail_if_pending(&self, id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE payments SET status = 'failed' WHERE id = ? AND status = 'pending'")
                .bind(id)
                .execute(&self.pool)
                .await
                .context("Failed to mark payment failed")?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mem_pool;

    fn sample(payload: &str) -> NewPayment<'_> {
        NewPayment {
            user_id: 1,
            stars: 100,
            amount_rub: 0.0,
            payload,
            subscription_days: 30,
            promo_code: None,
            method: PaymentMethod::Stars,
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let repo = PaymentRepository::new(mem_pool().await);
        let id = repo.create(sample("p1")).await.unwrap();

        let payment = repo.get(id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.stars, 100);
        assert!(payment.completed_at.is_none());

        let by_payload = repo.get_by_payload("p1").await.unwrap().unwrap();
        assert_eq!(by_payload.id, id);
    }

    #[tokio::test]
    async fn duplicate_payload_rejected() {
        let repo = PaymentRepository::new(mem_pool().await);
        repo.create(sample("dup")).await.unwrap();
        assert!(repo.create(sample("dup")).await.is_err());
    }

    #[tokio::test]
    async fn complete_is_single_shot() {
        let repo = PaymentRepository::new(mem_pool().await);
        let id = repo.create(sample("cas")).await.unwrap();

        assert!(repo.complete_if_pending(id, "uuid-1").await.unwrap());
        assert!(!repo.complete_if_pending(id, "uuid-2").await.unwrap());
        assert!(!repo.fail_if_pending(id).await.unwrap());

        let payment = repo.get(id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.panel_uuid.as_deref(), Some("uuid-1"));
        assert!(payment.completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_rows_stay_failed() {
        let repo = PaymentRepository::new(mem_pool().await);
        let id = repo.create(sample("fail")).await.unwrap();

        assert!(repo.fail_if_pending(id).await.unwrap());
        assert!(!repo.complete_if_pending(id, "uuid").await.unwrap());
        let payment = repo.get(id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn gateway_id_lookup() {
        let repo = PaymentRepository::new(mem_pool().await);
        let id = repo.create(sample("gw")).await.unwrap();
        repo.set_gateway_id(id, "yk-123").await.unwrap();
        let payment = repo.get_by_gateway_id("yk-123").await.unwrap().unwrap();
        assert_eq!(payment.id, id);
    }
}

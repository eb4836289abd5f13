use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::user::BotUser;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, telegram_id: i64) -> Result<Option<BotUser>> {
        let user = sqlx::query_as::<_, BotUser>("SELECT * FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;
        Ok(user)
    }

    /// Registers the user on first contact; later calls only refresh the username.
    pub async fn get_or_create(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        language: &str,
    ) -> Result<BotUser> {
        sqlx::query(
            r#"
            INSERT INTO users (telegram_id, username, language, registered_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(telegram_id) DO UPDATE SET
                username = COALESCE(excluded.username, users.username)
            "#,
        )
        .bind(telegram_id)
        .bind(username)
        .bind(language)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to upsert user")?;

        self.get(telegram_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} not found after upsert", telegram_id))
    }

    pub async fn update_language(&self, telegram_id: i64, language: &str) -> Result<()> {
        sqlx::query("UPDATE users SET language = ? WHERE telegram_id = ?")
            .bind(language)
            .bind(telegram_id)
            .execute(&self.pool)
            .await
            .context("Failed to update language")?;
        Ok(())
    }

    pub async fn set_trial_used(&self, telegram_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET trial_used = 1 WHERE telegram_id = ?")
            .bind(telegram_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// First write wins; self-referral is rejected at the query level.
    pub async fn set_referrer(&self, telegram_id: i64, referrer_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET referrer_id = ? \
             WHERE telegram_id = ? AND referrer_id IS NULL AND telegram_id != ?",
        )
        .bind(referrer_id)
        .bind(telegram_id)
        .bind(referrer_id)
        .execute(&self.pool)
        .await
        .context("Failed to set referrer")?;
        Ok(result.rows_affected() > 0)
    }

    /// Remembers the panel account once; an already linked user keeps its uuid.
    pub async fn link_panel_uuid(&self, telegram_id: i64, uuid: &str) -> Result<()> {
        sqlx::query("UPDATE users SET panel_uuid = ? WHERE telegram_id = ? AND panel_uuid IS NULL")
            .bind(uuid)
            .bind(telegram_id)
            .execute(&self.pool)
            .await
            .context("Failed to link panel uuid")?;
        Ok(())
    }

    pub async fn set_auto_renewal(&self, telegram_id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE users SET auto_renewal = ? WHERE telegram_id = ?")
            .bind(enabled)
            .bind(telegram_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_renewal_notification(&self, telegram_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_renewal_notification = ? WHERE telegram_id = ?")
            .bind(Utc::now())
            .bind(telegram_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Everyone the renewal sweep considers: linked to the panel and opted in.
    pub async fn with_auto_renewal(&self) -> Result<Vec<BotUser>> {
        let users = sqlx::query_as::<_, BotUser>(
            "SELECT * FROM users WHERE auto_renewal = 1 AND panel_uuid IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch auto-renewal users")?;
        Ok(users)
    }
}

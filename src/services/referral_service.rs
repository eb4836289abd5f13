use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::api_client::Provisioner;
use crate::models::user::BotUser;
use crate::repositories::{ReferralRepository, UserRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted { referrer_id: i64, days: i64 },
    AlreadyGranted,
    NoReferrer,
    /// The referrer has no panel account yet; retried on the referred
    /// user's next settlement.
    ReferrerUnprovisioned,
}

#[derive(Clone)]
pub struct ReferralService {
    users: UserRepository,
    referrals: ReferralRepository,
    api: Arc<dyn Provisioner>,
    bonus_days: i64,
}

impl ReferralService {
    pub fn new(
        users: UserRepository,
        referrals: ReferralRepository,
        api: Arc<dyn Provisioner>,
        bonus_days: i64,
    ) -> Self {
        Self {
            users,
            referrals,
            api,
            bonus_days,
        }
    }

    /// Extends the referrer once per referred user. The ledger row is written
    /// only after the panel extension succeeded, so a failed extension is
    /// retried on the next settlement instead of being lost.
    pub async fn grant_for_payment(&self, referred: &BotUser) -> Result<GrantOutcome> {
        let Some(referrer_id) = referred.referrer_id else {
            return Ok(GrantOutcome::NoReferrer);
        };
        if self
            .referrals
            .bonus_granted(referrer_id, referred.telegram_id)
            .await?
        {
            return Ok(GrantOutcome::AlreadyGranted);
        }

        let referrer = self
            .users
            .get(referrer_id)
            .await?
            .filter(|u| u.panel_uuid.is_some());
        let Some(referrer) = referrer else {
            return Ok(GrantOutcome::ReferrerUnprovisioned);
        };
        let uuid = referrer.panel_uuid.as_deref().unwrap_or_default();

        let account = self
            .api
            .account_by_uuid(uuid)
            .await
            .context("Failed to fetch referrer account")?;
        let now = Utc::now();
        let base = account.expire_at.filter(|at| *at > now).unwrap_or(now);
        self.api
            .set_expiry(uuid, base + Duration::days(self.bonus_days))
            .await
            .context("Failed to extend referrer account")?;

        if !self
            .referrals
            .grant(referrer_id, referred.telegram_id, self.bonus_days)
            .await?
        {
            // A concurrent settlement got here first; the panel extension
            // above doubled up. Accepted over losing the bonus entirely.
            warn!(referrer_id, referred = referred.telegram_id, "referral grant raced");
            return Ok(GrantOutcome::AlreadyGranted);
        }

        info!(
            referrer_id,
            referred = referred.telegram_id,
            days = self.bonus_days,
            "referral bonus granted"
        );
        Ok(GrantOutcome::Granted {
            referrer_id,
            days: self.bonus_days,
        })
    }
}

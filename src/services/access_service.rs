use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::api_client::{ApiError, NewAccount, Provisioner};
use crate::models::user::BotUser;
use crate::repositories::UserRepository;
use crate::services::referral_service::{GrantOutcome, ReferralService};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub enum TrialOutcome {
    Activated {
        days: i64,
        expiry: DateTime<Utc>,
        link: Option<String>,
        referral_granted: Option<(i64, i64)>,
    },
    AlreadyUsed,
    /// The user already bought access, the trial is for newcomers only.
    NotEligible,
}

#[derive(Debug, Clone)]
pub enum AccessInfo {
    Active {
        expiry: Option<DateTime<Utc>>,
        link: Option<String>,
    },
    None,
}

/// Trial activation and the "my access" screen.
#[derive(Clone)]
pub struct AccessService {
    users: UserRepository,
    api: Arc<dyn Provisioner>,
    referrals: ReferralService,
    settings: Arc<Settings>,
}

impl AccessService {
    pub fn new(
        users: UserRepository,
        api: Arc<dyn Provisioner>,
        referrals: ReferralService,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            users,
            api,
            referrals,
            settings,
        }
    }

    /// One trial per user, and only before any paid account exists. The flag
    /// flips after provisioning succeeded, so a panel outage does not burn
    /// the user's only attempt.
    pub async fn activate_trial(&self, user: &BotUser) -> Result<TrialOutcome> {
        if user.trial_used {
            return Ok(TrialOutcome::AlreadyUsed);
        }
        if user.panel_uuid.is_some()
            || self
                .api
                .account_by_telegram_id(user.telegram_id)
                .await
                .context("Failed to look up existing account")?
                .is_some()
        {
            return Ok(TrialOutcome::NotEligible);
        }

        let days = self.settings.trial_days;
        let expiry = Utc::now() + Duration::days(days);
        let account = self
            .api
            .create_account(&NewAccount {
                username: user.panel_username(),
                telegram_id: user.telegram_id,
                expire_at: expiry,
                internal_squads: self.settings.internal_squads.clone(),
            })
            .await
            .context("Failed to create trial account")?;

        self.users
            .link_panel_uuid(user.telegram_id, &account.uuid)
            .await?;
        self.users.set_trial_used(user.telegram_id).await?;
        info!(user_id = user.telegram_id, days, "trial activated");

        // Best effort, a failed grant is retried on the first settlement.
        let referral_granted = match self.referrals.grant_for_payment(user).await {
            Ok(GrantOutcome::Granted { referrer_id, days }) => Some((referrer_id, days)),
            Ok(_) => None,
            Err(err) => {
                warn!(user_id = user.telegram_id, error = %err, "referral grant failed");
                None
            }
        };

        Ok(TrialOutcome::Activated {
            days,
            expiry,
            link: account.subscription_url,
            referral_granted,
        })
    }

    pub async fn access_info(&self, user: &BotUser) -> Result<AccessInfo> {
        let uuid = match &user.panel_uuid {
            Some(uuid) => Some(uuid.clone()),
            None => {
                let found = self
                    .api
                    .account_by_telegram_id(user.telegram_id)
                    .await
                    .context("Failed to look up account")?;
                if let Some(account) = &found {
                    self.users
                        .link_panel_uuid(user.telegram_id, &account.uuid)
                        .await?;
                }
                found.map(|a| a.uuid)
            }
        };
        let Some(uuid) = uuid else {
            return Ok(AccessInfo::None);
        };

        match self.api.account_by_uuid(&uuid).await {
            Ok(account) => Ok(AccessInfo::Active {
                expiry: account.expire_at,
                link: account.subscription_url,
            }),
            Err(ApiError::NotFound) => Ok(AccessInfo::None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{PanelAccount, PanelNode, PanelStats};
    use crate::db::mem_pool;
    use crate::repositories::ReferralRepository;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePanel {
        accounts: Mutex<HashMap<i64, PanelAccount>>,
    }

    #[async_trait]
    impl Provisioner for FakePanel {
        async fn health(&self) -> Result<(), ApiError> {
            Ok(())
        }
        async fn account_by_telegram_id(
            &self,
            telegram_id: i64,
        ) -> Result<Option<PanelAccount>, ApiError> {
            Ok(self.accounts.lock().unwrap().get(&telegram_id).cloned())
        }
        async fn account_by_uuid(&self, uuid: &str) -> Result<PanelAccount, ApiError> {
            self.accounts
                .lock()
                .unwrap()
                .values()
                .find(|a| a.uuid == uuid)
                .cloned()
                .ok_or(ApiError::NotFound)
        }
        async fn create_account(&self, new: &NewAccount) -> Result<PanelAccount, ApiError> {
            let account = PanelAccount {
                uuid: format!("uuid-{}", new.telegram_id),
                expire_at: Some(new.expire_at),
                subscription_url: Some("https://sub/t".to_string()),
            };
            self.accounts
                .lock()
                .unwrap()
                .insert(new.telegram_id, account.clone());
            Ok(account)
        }
        async fn set_expiry(
            &self,
            uuid: &str,
            expire_at: DateTime<Utc>,
        ) -> Result<PanelAccount, ApiError> {
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .values_mut()
                .find(|a| a.uuid == uuid)
                .ok_or(ApiError::NotFound)?;
            account.expire_at = Some(expire_at);
            Ok(account.clone())
        }
        async fn subscription_link(&self, _uuid: &str) -> Result<Option<String>, ApiError> {
            Ok(None)
        }
        async fn stats(&self) -> Result<PanelStats, ApiError> {
            Ok(Default::default())
        }
        async fn nodes(&self) -> Result<Vec<PanelNode>, ApiError> {
            Ok(Vec::new())
        }
    }

    async fn setup() -> (AccessService, UserRepository, Arc<FakePanel>, ReferralRepository) {
        let pool = mem_pool().await;
        let users = UserRepository::new(pool.clone());
        let referrals = ReferralRepository::new(pool);
        let panel = Arc::new(FakePanel::default());
        let referral_svc =
            ReferralService::new(users.clone(), referrals.clone(), panel.clone(), 3);
        let svc = AccessService::new(
            users.clone(),
            panel.clone(),
            referral_svc,
            Arc::new(Settings::for_tests()),
        );
        (svc, users, panel, referrals)
    }

    #[tokio::test]
    async fn trial_activates_once() {
        let (svc, users, _, _) = setup().await;
        let user = users.get_or_create(1, None, "ru").await.unwrap();

        assert!(matches!(
            svc.activate_trial(&user).await.unwrap(),
            TrialOutcome::Activated { days: 3, .. }
        ));

        let user = users.get(1).await.unwrap().unwrap();
        assert!(user.trial_used);
        assert_eq!(user.panel_uuid.as_deref(), Some("uuid-1"));
        assert!(matches!(
            svc.activate_trial(&user).await.unwrap(),
            TrialOutcome::AlreadyUsed
        ));
    }

    #[tokio::test]
    async fn trial_denied_to_provisioned_users() {
        let (svc, users, _, _) = setup().await;
        users.get_or_create(2, None, "ru").await.unwrap();
        users.link_panel_uuid(2, "existing").await.unwrap();
        let user = users.get(2).await.unwrap().unwrap();

        assert!(matches!(
            svc.activate_trial(&user).await.unwrap(),
            TrialOutcome::NotEligible
        ));
        assert!(!users.get(2).await.unwrap().unwrap().trial_used);
    }

    #[tokio::test]
    async fn trial_grants_referral_bonus() {
        let (svc, users, panel, referrals) = setup().await;
        users.get_or_create(10, None, "ru").await.unwrap();
        users.link_panel_uuid(10, "uuid-10").await.unwrap();
        panel.accounts.lock().unwrap().insert(
            10,
            PanelAccount {
                uuid: "uuid-10".to_string(),
                expire_at: Some(Utc::now() + Duration::days(5)),
                subscription_url: None,
            },
        );
        users.get_or_create(11, None, "ru").await.unwrap();
        users.set_referrer(11, 10).await.unwrap();
        let user = users.get(11).await.unwrap().unwrap();

        let outcome = svc.activate_trial(&user).await.unwrap();
        let TrialOutcome::Activated { referral_granted, .. } = outcome else {
            panic!("expected activation");
        };
        assert_eq!(referral_granted, Some((10, 3)));
        let summary = referrals.summary_for(10).await.unwrap();
        assert_eq!(summary.invited, 1);
        assert_eq!(summary.bonus_days, 3);
    }

    #[tokio::test]
    async fn access_info_for_unprovisioned_user() {
        let (svc, users, _, _) = setup().await;
        let user = users.get_or_create(3, None, "ru").await.unwrap();
        assert!(matches!(
            svc.access_info(&user).await.unwrap(),
            AccessInfo::None
        ));
    }

    #[tokio::test]
    async fn access_info_after_trial() {
        let (svc, users, _, _) = setup().await;
        let user = users.get_or_create(4, None, "ru").await.unwrap();
        svc.activate_trial(&user).await.unwrap();

        let user = users.get(4).await.unwrap().unwrap();
        let info = svc.access_info(&user).await.unwrap();
        let AccessInfo::Active { expiry, link } = info else {
            panic!("expected active access");
        };
        assert!(expiry.is_some());
        assert_eq!(link.as_deref(), Some("https://sub/t"));
    }
}

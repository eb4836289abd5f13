use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::api_client::Provisioner;
use crate::repositories::UserRepository;
use crate::services::notification_service::{sweep_summary, Notifier};
use crate::texts::{Locale, Text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderBand {
    /// 3 to 5 full days left.
    Early,
    /// Less than two full days left.
    Urgent,
    /// Already past expiry.
    Expired,
}

impl ReminderBand {
    fn cooldown(self) -> Duration {
        match self {
            ReminderBand::Early => Duration::hours(24),
            ReminderBand::Urgent => Duration::hours(12),
            ReminderBand::Expired => Duration::hours(24),
        }
    }
}

/// Full days left, negative once expired. Floor division keeps "23 hours
/// left" at zero days rather than rounding up to one.
pub fn days_left(now: DateTime<Utc>, expiry: DateTime<Utc>) -> i64 {
    (expiry - now).num_seconds().div_euclid(86_400)
}

pub fn reminder_band(now: DateTime<Utc>, expiry: DateTime<Utc>) -> Option<(ReminderBand, i64)> {
    let days = days_left(now, expiry);
    match days {
        3..=5 => Some((ReminderBand::Early, days)),
        1 => Some((ReminderBand::Urgent, days)),
        _ if days < 0 => Some((ReminderBand::Expired, days)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub notified_early: usize,
    pub notified_urgent: usize,
    pub notified_expired: usize,
    pub skipped_cooldown: usize,
    pub errors: usize,
}

/// Periodic reminder sweep over everyone with reminders enabled.
#[derive(Clone)]
pub struct RenewalService {
    users: UserRepository,
    api: Arc<dyn Provisioner>,
    notifier: Arc<dyn Notifier>,
}

impl RenewalService {
    pub fn new(
        users: UserRepository,
        api: Arc<dyn Provisioner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users,
            api,
            notifier,
        }
    }

    pub async fn run(self, interval_hours: u64) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_hours * 3600));
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(report) => {
                    info!(?report, "renewal sweep finished");
                    let _ = self.notifier.notify_admins(sweep_summary(&report)).await;
                }
                Err(err) => error!(error = %err, "renewal sweep failed"),
            }
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        for user in self.users.with_auto_renewal().await? {
            report.checked += 1;
            let Some(uuid) = user.panel_uuid.as_deref() else {
                continue;
            };
            let expiry = match self.api.account_by_uuid(uuid).await {
                Ok(account) => account.expire_at,
                Err(err) => {
                    warn!(user_id = user.telegram_id, error = %err, "account fetch failed in sweep");
                    report.errors += 1;
                    continue;
                }
            };
            let Some(expiry) = expiry else { continue };
            let Some((band, days)) = reminder_band(now, expiry) else {
                continue;
            };

            if let Some(last) = user.last_renewal_notification {
                if now - last < band.cooldown() {
                    report.skipped_cooldown += 1;
                    continue;
                }
            }

            let locale = Locale::from_code(&user.language);
            let text = match band {
                ReminderBand::Early => Text::RenewalEarly { days_left: days },
                ReminderBand::Urgent => Text::RenewalUrgent,
                ReminderBand::Expired => Text::RenewalExpired,
            };
            if let Err(err) = self
                .notifier
                .notify_user(user.telegram_id, text.render(locale))
                .await
            {
                warn!(user_id = user.telegram_id, error = %err, "renewal reminder failed");
                report.errors += 1;
            } else {
                match band {
                    ReminderBand::Early => report.notified_early += 1,
                    ReminderBand::Urgent => report.notified_urgent += 1,
                    ReminderBand::Expired => report.notified_expired += 1,
                }
            }
            // Updated regardless of delivery, a bouncing chat must not be
            // retried every sweep.
            self.users
                .touch_renewal_notification(user.telegram_id)
                .await?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ApiError, NewAccount, PanelAccount, PanelNode, PanelStats};
    use crate::db::mem_pool;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn bands_follow_days_left() {
        let now = Utc::now();
        let at = |days: i64, hours: i64| now + Duration::days(days) + Duration::hours(hours);

        assert_eq!(reminder_band(now, at(4, 0)).unwrap().0, ReminderBand::Early);
        assert_eq!(reminder_band(now, at(3, 1)).unwrap().0, ReminderBand::Early);
        assert_eq!(reminder_band(now, at(5, 23)).unwrap().0, ReminderBand::Early);
        assert!(reminder_band(now, at(6, 1)).is_none());
        assert!(reminder_band(now, at(2, 1)).is_none());
        assert_eq!(
            reminder_band(now, at(1, 1)).unwrap().0,
            ReminderBand::Urgent
        );
        assert!(reminder_band(now, at(0, 5)).is_none());
        assert_eq!(
            reminder_band(now, at(0, -5)).unwrap().0,
            ReminderBand::Expired
        );
        assert_eq!(
            reminder_band(now, at(-10, 0)).unwrap().0,
            ReminderBand::Expired
        );
    }

    #[test]
    fn days_left_floors_toward_expiry() {
        let now = Utc::now();
        assert_eq!(days_left(now, now + Duration::hours(23)), 0);
        assert_eq!(days_left(now, now + Duration::hours(25)), 1);
        assert_eq!(days_left(now, now - Duration::hours(1)), -1);
    }

    struct FakePanel {
        expiries: HashMap<String, DateTime<Utc>>,
    }

    #[async_trait]
    impl Provisioner for FakePanel {
        async fn health(&self) -> Result<(), ApiError> {
            Ok(())
        }
        async fn account_by_telegram_id(
            &self,
            _id: i64,
        ) -> Result<Option<PanelAccount>, ApiError> {
            Ok(None)
        }
        async fn account_by_uuid(&self, uuid: &str) -> Result<PanelAccount, ApiError> {
            self.expiries
                .get(uuid)
                .map(|at| PanelAccount {
                    uuid: uuid.to_string(),
                    expire_at: Some(*at),
                    subscription_url: None,
                })
                .ok_or(ApiError::NotFound)
        }
        async fn create_account(&self, _new: &NewAccount) -> Result<PanelAccount, ApiError> {
            unreachable!()
        }
        async fn set_expiry(
            &self,
            _uuid: &str,
            _at: DateTime<Utc>,
        ) -> Result<PanelAccount, ApiError> {
            unreachable!()
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

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        fail_for: Option<i64>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_user(&self, user_id: i64, text: String) -> Result<()> {
            if self.fail_for == Some(user_id) {
                anyhow::bail!("chat unavailable");
            }
            self.sent.lock().unwrap().push((user_id, text));
            Ok(())
        }
        async fn notify_admins(&self, _text: String) -> Result<()> {
            Ok(())
        }
    }

    async fn seed_user(users: &UserRepository, id: i64, uuid: &str) {
        users.get_or_create(id, None, "ru").await.unwrap();
        users.link_panel_uuid(id, uuid).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_notifies_by_band_and_reports() {
        let users = UserRepository::new(mem_pool().await);
        let now = Utc::now();
        seed_user(&users, 1, "early").await;
        seed_user(&users, 2, "urgent").await;
        seed_user(&users, 3, "expired").await;
        seed_user(&users, 4, "healthy").await;
        seed_user(&users, 5, "missing").await;

        let mut expiries = HashMap::new();
        expiries.insert("early".to_string(), now + Duration::days(4));
        expiries.insert("urgent".to_string(), now + Duration::hours(30));
        expiries.insert("expired".to_string(), now - Duration::days(2));
        expiries.insert("healthy".to_string(), now + Duration::days(20));

        let notifier = Arc::new(RecordingNotifier::default());
        let svc = RenewalService::new(
            users.clone(),
            Arc::new(FakePanel { expiries }),
            notifier.clone(),
        );

        let report = svc.sweep().await.unwrap();
        assert_eq!(report.checked, 5);
        assert_eq!(report.notified_early, 1);
        assert_eq!(report.notified_urgent, 1);
        assert_eq!(report.notified_expired, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 3);

        // Every reminded user is now inside a cooldown window.
        let report = svc.sweep().await.unwrap();
        assert_eq!(report.skipped_cooldown, 3);
        assert_eq!(notifier.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_delivery_still_starts_cooldown() {
        let users = UserRepository::new(mem_pool().await);
        let now = Utc::now();
        seed_user(&users, 9, "soon").await;

        let mut expiries = HashMap::new();
        expiries.insert("soon".to_string(), now + Duration::hours(30));
        let notifier = Arc::new(RecordingNotifier {
            fail_for: Some(9),
            ..Default::default()
        });
        let svc = RenewalService::new(
            users.clone(),
            Arc::new(FakePanel { expiries }),
            notifier,
        );

        let report = svc.sweep().await.unwrap();
        assert_eq!(report.errors, 1);
        assert!(users
            .get(9)
            .await
            .unwrap()
            .unwrap()
            .last_renewal_notification
            .is_some());
    }
}

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ThreadId};
use tracing::warn;

use crate::services::reconcile_service::SettleReceipt;
use crate::services::renewal_service::SweepReport;

/// Outbound messages that are not replies to an update. Mocked in tests so
/// the sweep can run without a live bot.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: i64, text: String) -> Result<()>;
    async fn notify_admins(&self, text: String) -> Result<()>;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    admin_chat_id: Option<i64>,
    admin_topic_id: Option<i32>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, admin_chat_id: Option<i64>, admin_topic_id: Option<i32>) -> Self {
        Self {
            bot,
            admin_chat_id,
            admin_topic_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_user(&self, user_id: i64, text: String) -> Result<()> {
        self.bot.send_message(ChatId(user_id), text).await?;
        Ok(())
    }

    async fn notify_admins(&self, text: String) -> Result<()> {
        let Some(chat_id) = self.admin_chat_id else {
            return Ok(());
        };
        let mut req = self.bot.send_message(ChatId(chat_id), text);
        if let Some(topic_id) = self.admin_topic_id {
            req = req.message_thread_id(ThreadId(MessageId(topic_id)));
        }
        if let Err(err) = req.await {
            warn!(chat_id, error = %err, "admin notification failed");
        }
        Ok(())
    }
}

pub fn payment_report(receipt: &SettleReceipt, method: &str, amount_label: &str) -> String {
    let mut report = format!(
        "💰 Payment settled\nUser: {}\nMethod: {}\nAmount: {}\nDays: {}\nActive until: {}",
        receipt.user_id,
        method,
        amount_label,
        receipt.days,
        receipt.new_expiry.format("%d.%m.%Y %H:%M"),
    );
    if let Some((referrer_id, days)) = receipt.referral_granted {
        report.push_str(&format!("\nReferral bonus: +{days}d to {referrer_id}"));
    }
    report
}

pub fn trial_report(user_id: i64, days: i64, referral_granted: Option<(i64, i64)>) -> String {
    let mut report = format!("🎁 Trial activated\nUser: {user_id}\nDays: {days}");
    if let Some((referrer_id, days)) = referral_granted {
        report.push_str(&format!("\nReferral bonus: +{days}d to {referrer_id}"));
    }
    report
}

pub fn sweep_summary(report: &SweepReport) -> String {
    format!(
        "🔄 Renewal sweep\nChecked: {}\nEarly: {}\nUrgent: {}\nExpired: {}\nSkipped (cooldown): {}\nErrors: {}",
        report.checked,
        report.notified_early,
        report.notified_urgent,
        report.notified_expired,
        report.skipped_cooldown,
        report.errors,
    )
}

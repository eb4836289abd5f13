use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::api_client::{ApiError, NewAccount, PanelAccount, Provisioner};
use crate::models::payment::{InvoicePayload, Payment, PaymentStatus};
use crate::models::user::BotUser;
use crate::repositories::promo_repo::UsageOutcome;
use crate::repositories::{PaymentRepository, PromoRepository, UserRepository};
use crate::services::gateway::{Gateway, GatewayError, GatewayStatus};
use crate::services::referral_service::{GrantOutcome, ReferralService};
use crate::settings::Settings;
use crate::sync::KeyedLocks;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invoice payload did not decode")]
    Payload,
    #[error("no payment matches this confirmation")]
    UnknownPayment,
    #[error("payment is not pending")]
    NotPending,
    #[error("charged amount does not match the invoice")]
    AmountMismatch,
    #[error(transparent)]
    Provision(#[from] ApiError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What the handler reports back to the user after settlement.
#[derive(Debug, Clone)]
pub struct SettleReceipt {
    pub user_id: i64,
    pub panel_uuid: String,
    pub days: i64,
    pub new_expiry: DateTime<Utc>,
    pub subscription_url: Option<String>,
    pub referral_granted: Option<(i64, i64)>,
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Settled(SettleReceipt),
    /// The payment was settled earlier; a replay changes nothing.
    AlreadySettled,
    /// Gateway rail only: the remote payment has not succeeded yet.
    StillPending,
    /// Gateway rail only: the remote payment was canceled.
    Canceled,
}

/// Turns a confirmed charge into subscription time, exactly once per payment.
/// The per-payload lock serializes racing confirmations in-process and the
/// status compare-and-set closes the remaining window.
#[derive(Clone)]
pub struct ReconcileService {
    users: UserRepository,
    payments: PaymentRepository,
    promos: PromoRepository,
    api: Arc<dyn Provisioner>,
    gateway: Arc<dyn Gateway>,
    referrals: ReferralService,
    locks: KeyedLocks,
    settings: Arc<Settings>,
}

impl ReconcileService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: UserRepository,
        payments: PaymentRepository,
        promos: PromoRepository,
        api: Arc<dyn Provisioner>,
        gateway: Arc<dyn Gateway>,
        referrals: ReferralService,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            users,
            payments,
            promos,
            api,
            gateway,
            referrals,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    /// Pre-checkout gate for the Stars rail. Runs before Telegram charges the
    /// user, so a rejection here costs nothing.
    pub async fn precheck_stars(
        &self,
        payload_raw: &str,
        total_amount: u32,
    ) -> Result<(), ReconcileError> {
        InvoicePayload::decode(payload_raw).map_err(|_| ReconcileError::Payload)?;
        let payment = self
            .payments
            .get_by_payload(payload_raw)
            .await?
            .ok_or(ReconcileError::UnknownPayment)?;
        if payment.status != PaymentStatus::Pending {
            return Err(ReconcileError::NotPending);
        }
        if payment.stars != total_amount as i64 {
            // Rail-level decline only; the row stays pending so a correct
            // confirmation can still settle it.
            return Err(ReconcileError::AmountMismatch);
        }
        Ok(())
    }

    /// Settles a successful Stars charge. The user has already paid, so from
    /// here every failure leaves the row pending for a later retry.
    pub async fn confirm_stars(
        &self,
        payload_raw: &str,
        total_amount: u32,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        InvoicePayload::decode(payload_raw).map_err(|_| ReconcileError::Payload)?;
        let _guard = self.locks.lock(payload_raw).await;

        let payment = self
            .payments
            .get_by_payload(payload_raw)
            .await?
            .ok_or(ReconcileError::UnknownPayment)?;
        match payment.status {
            PaymentStatus::Completed => return Ok(ReconcileOutcome::AlreadySettled),
            PaymentStatus::Failed => return Err(ReconcileError::NotPending),
            PaymentStatus::Pending => {}
        }
        if payment.stars != total_amount as i64 {
            // The money is taken, refusing service would strand the charge.
            warn!(
                payment_id = payment.id,
                expected = payment.stars,
                charged = total_amount,
                "stars amount diverged from invoice, settling anyway"
            );
        }
        self.settle(payment).await
    }

    /// Polls the gateway status and settles when the remote payment
    /// succeeded. Safe to call repeatedly from the "check payment" button.
    pub async fn confirm_gateway(
        &self,
        gateway_payment_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let payment = self
            .payments
            .get_by_gateway_id(gateway_payment_id)
            .await?
            .ok_or(ReconcileError::UnknownPayment)?;
        match payment.status {
            PaymentStatus::Completed => return Ok(ReconcileOutcome::AlreadySettled),
            PaymentStatus::Failed => return Err(ReconcileError::NotPending),
            PaymentStatus::Pending => {}
        }

        let remote = self.gateway.payment_status(gateway_payment_id).await?;
        match remote.status {
            GatewayStatus::Succeeded => {
                let _guard = self.locks.lock(&payment.payload).await;
                let payment = self
                    .payments
                    .get(payment.id)
                    .await?
                    .ok_or(ReconcileError::UnknownPayment)?;
                match payment.status {
                    PaymentStatus::Completed => Ok(ReconcileOutcome::AlreadySettled),
                    PaymentStatus::Failed => Err(ReconcileError::NotPending),
                    PaymentStatus::Pending => self.settle(payment).await,
                }
            }
            GatewayStatus::Canceled => {
                self.payments.fail_if_pending(payment.id).await?;
                Ok(ReconcileOutcome::Canceled)
            }
            GatewayStatus::Pending | GatewayStatus::WaitingForCapture => {
                Ok(ReconcileOutcome::StillPending)
            }
        }
    }

    /// The settlement itself. Caller holds the payload lock and has verified
    /// the row is pending.
    async fn settle(&self, payment: Payment) -> Result<ReconcileOutcome, ReconcileError> {
        let user = self
            .users
            .get(payment.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment {} has no user row", payment.id))?;

        let days = payment.subscription_days;
        let (account, new_expiry) = self.provision(&user, days).await?;

        if !self
            .payments
            .complete_if_pending(payment.id, &account.uuid)
            .await?
        {
            return Ok(ReconcileOutcome::AlreadySettled);
        }

        if let Some(code) = &payment.promo_code {
            match self.promos.record_usage(code, user.telegram_id).await? {
                UsageOutcome::Recorded | UsageOutcome::AlreadyRecorded => {}
                UsageOutcome::Exhausted => {
                    // The invoice was already paid at the discounted price.
                    warn!(code, payment_id = payment.id, "promo exhausted at settlement");
                }
            }
        }
        self.users
            .link_panel_uuid(user.telegram_id, &account.uuid)
            .await?;
        info!(
            payment_id = payment.id,
            user_id = user.telegram_id,
            days,
            expiry = %new_expiry,
            "payment settled"
        );

        // Best effort, a failed grant is retried on the next settlement.
        let user = self.users.get(user.telegram_id).await?.unwrap_or(user);
        let referral_granted = match self.referrals.grant_for_payment(&user).await {
            Ok(GrantOutcome::Granted { referrer_id, days }) => Some((referrer_id, days)),
            Ok(_) => None,
            Err(err) => {
                warn!(user_id = user.telegram_id, error = %err, "referral grant failed");
                None
            }
        };

        Ok(ReconcileOutcome::Settled(SettleReceipt {
            user_id: user.telegram_id,
            panel_uuid: account.uuid,
            days,
            new_expiry,
            subscription_url: account.subscription_url,
            referral_granted,
        }))
    }

    /// Extends the existing panel account or creates one for a first-time
    /// buyer. An unreadable remote expiry degrades to "now" and extends, it
    /// never re-creates an account that might still exist.
    async fn provision(
        &self,
        user: &BotUser,
        days: i64,
    ) -> Result<(PanelAccount, DateTime<Utc>), ReconcileError> {
        let now = Utc::now();

        let known = match &user.panel_uuid {
            Some(uuid) => Some((uuid.clone(), self.remote_expiry(uuid, now).await?)),
            None => match self.api.account_by_telegram_id(user.telegram_id).await? {
                Some(account) => {
                    let base = account.expire_at.filter(|at| *at > now).unwrap_or(now);
                    Some((account.uuid, base))
                }
                None => None,
            },
        };

        match known {
            Some((uuid, base)) => {
                let expiry = base + Duration::days(days);
                let account = self.api.set_expiry(&uuid, expiry).await?;
                Ok((account, expiry))
            }
            None => {
                let expiry = now + Duration::days(days);
                let account = self
                    .api
                    .create_account(&NewAccount {
                        username: user.panel_username(),
                        telegram_id: user.telegram_id,
                        expire_at: expiry,
                        internal_squads: self.settings.internal_squads.clone(),
                    })
                    .await?;
                Ok((account, expiry))
            }
        }
    }

    async fn remote_expiry(
        &self,
        uuid: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ReconcileError> {
        match self.api.account_by_uuid(uuid).await {
            Ok(account) => Ok(account.expire_at.filter(|at| *at > now).unwrap_or(now)),
            Err(ApiError::Unauthorized) => Err(ApiError::Unauthorized.into()),
            Err(err) => {
                warn!(uuid, error = %err, "remote expiry unreadable, extending from now");
                Ok(now)
            }
        }
    }
}

use std::sync::Arc;

use tracing::info;

use crate::models::payment::{InvoicePayload, PaymentMethod};
use crate::models::promo::PromoCode;
use crate::repositories::payment_repo::NewPayment;
use crate::repositories::PaymentRepository;
use crate::services::gateway::{Gateway, GatewayError, GatewayMethod};
use crate::services::pricing::{self, Quote};
use crate::settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything the handler needs to send a Stars invoice.
#[derive(Debug, Clone)]
pub struct StarsIntent {
    pub payment_id: i64,
    pub payload: String,
    pub quote: Quote,
}

/// Everything the handler needs to hand the user a gateway payment.
#[derive(Debug, Clone)]
pub struct GatewayIntent {
    pub payment_id: i64,
    pub gateway_payment_id: String,
    pub confirmation_url: Option<String>,
    pub quote: Quote,
}

/// Issues payment intents. The local row is written before anything leaves
/// the process, so every later confirmation has a pending row to settle.
#[derive(Clone)]
pub struct PayService {
    payments: PaymentRepository,
    gateway: Arc<dyn Gateway>,
    settings: Arc<Settings>,
}

impl PayService {
    pub fn new(
        payments: PaymentRepository,
        gateway: Arc<dyn Gateway>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            payments,
            gateway,
            settings,
        }
    }

    pub async fn issue_stars(
        &self,
        user_id: i64,
        quote: &Quote,
    ) -> Result<StarsIntent, IssueError> {
        let payload = InvoicePayload::new(
            user_id,
            quote.duration.months(),
            quote.promo_code.clone(),
            quote.bonus_days,
        )
        .encode();

        let payment_id = self
            .payments
            .create(NewPayment {
                user_id,
                stars: quote.stars as i64,
                amount_rub: 0.0,
                payload: &payload,
                subscription_days: quote.days + quote.bonus_days,
                promo_code: quote.promo_code.as_deref(),
                method: PaymentMethod::Stars,
            })
            .await?;

        info!(user_id, payment_id, stars = quote.stars, "issued stars invoice");
        Ok(StarsIntent {
            payment_id,
            payload,
            quote: quote.clone(),
        })
    }

    pub async fn issue_gateway(
        &self,
        user_id: i64,
        quote: &Quote,
        method: GatewayMethod,
    ) -> Result<GatewayIntent, IssueError> {
        let payload = InvoicePayload::new(
            user_id,
            quote.duration.months(),
            quote.promo_code.clone(),
            quote.bonus_days,
        )
        .encode();

        let payment_id = self
            .payments
            .create(NewPayment {
                user_id,
                stars: 0,
                amount_rub: quote.rub,
                payload: &payload,
                subscription_days: quote.days + quote.bonus_days,
                promo_code: quote.promo_code.as_deref(),
                method: match method {
                    GatewayMethod::Card => PaymentMethod::Card,
                    GatewayMethod::Sbp => PaymentMethod::Sbp,
                },
            })
            .await?;

        let description = format!(
            "Subscription for {} month(s), user {}",
            quote.duration.months(),
            user_id
        );
        // The payload doubles as the gateway idempotence key, a retried
        // create returns the same remote payment.
        let remote = self
            .gateway
            .create_payment(quote.rub, &description, method, &payload)
            .await?;

        self.payments
            .set_gateway_id(payment_id, &remote.id)
            .await
            .map_err(IssueError::Other)?;

        info!(user_id, payment_id, gateway_id = %remote.id, "issued gateway payment");
        Ok(GatewayIntent {
            payment_id,
            gateway_payment_id: remote.id,
            confirmation_url: remote.confirmation_url,
            quote: quote.clone(),
        })
    }

    pub fn resolve_quote(&self, duration: crate::models::plan::PlanDuration, promo: Option<&PromoCode>) -> Quote {
        pricing::quote(&self.settings, duration, promo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mem_pool;
    use crate::models::payment::PaymentStatus;
    use crate::models::plan::PlanDuration;
    use crate::services::gateway::{GatewayPayment, GatewayStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeGateway {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Gateway for FakeGateway {
        async fn create_payment(
            &self,
            _amount_rub: f64,
            _description: &str,
            _method: GatewayMethod,
            idempotence_key: &str,
        ) -> Result<GatewayPayment, GatewayError> {
            self.keys.lock().unwrap().push(idempotence_key.to_string());
            Ok(GatewayPayment {
                id: "gw-1".to_string(),
                status: GatewayStatus::Pending,
                confirmation_url: Some("https://pay/confirm".to_string()),
            })
        }

        async fn payment_status(&self, _id: &str) -> Result<GatewayPayment, GatewayError> {
            unreachable!()
        }
    }

    fn service(payments: PaymentRepository, gateway: Arc<dyn Gateway>) -> PayService {
        PayService::new(payments, gateway, Arc::new(Settings::for_tests()))
    }

    #[tokio::test]
    async fn stars_intent_persists_pending_row() {
        let payments = PaymentRepository::new(mem_pool().await);
        let svc = service(payments.clone(), Arc::new(FakeGateway { keys: Mutex::new(Vec::new()) }));

        let quote = svc.resolve_quote(PlanDuration::ThreeMonths, None);
        let intent = svc.issue_stars(7, &quote).await.unwrap();

        let row = payments.get(intent.payment_id).await.unwrap().unwrap();
        assert_eq!(row.status, PaymentStatus::Pending);
        assert_eq!(row.stars, 250);
        assert_eq!(row.subscription_days, 90);
        assert_eq!(row.payload, intent.payload);
    }

    #[tokio::test]
    async fn promo_bonus_days_extend_the_grant() {
        let payments = PaymentRepository::new(mem_pool().await);
        let svc = service(payments.clone(), Arc::new(FakeGateway { keys: Mutex::new(Vec::new()) }));

        let promo = crate::models::promo::PromoCode {
            code: "EXTRA3".to_string(),
            discount_percent: 0,
            bonus_days: 3,
            max_uses: 0,
            current_uses: 0,
            is_active: true,
            expires_at: None,
            created_at: chrono::Utc::now(),
        };
        let quote = svc.resolve_quote(PlanDuration::ThreeMonths, Some(&promo));
        let intent = svc.issue_stars(7, &quote).await.unwrap();

        let row = payments.get(intent.payment_id).await.unwrap().unwrap();
        assert_eq!(row.subscription_days, 93);
        assert_eq!(row.promo_code.as_deref(), Some("EXTRA3"));
    }

    #[tokio::test]
    async fn gateway_intent_uses_payload_as_idempotence_key() {
        let payments = PaymentRepository::new(mem_pool().await);
        let gateway = Arc::new(FakeGateway { keys: Mutex::new(Vec::new()) });
        let svc = service(payments.clone(), gateway.clone());

        let quote = svc.resolve_quote(PlanDuration::OneMonth, None);
        let intent = svc.issue_gateway(7, &quote, GatewayMethod::Card).await.unwrap();

        let row = payments.get(intent.payment_id).await.unwrap().unwrap();
        assert_eq!(gateway.keys.lock().unwrap().as_slice(), &[row.payload.clone()]);
        assert_eq!(row.gateway_payment_id.as_deref(), Some("gw-1"));
        assert_eq!(row.amount_rub, 100.0);
        assert_eq!(row.stars, 0);
    }

    #[tokio::test]
    async fn disabled_gateway_surfaces_not_configured() {
        let payments = PaymentRepository::new(mem_pool().await);
        let svc = service(payments, Arc::new(crate::services::gateway::DisabledGateway));

        let quote = svc.resolve_quote(PlanDuration::OneMonth, None);
        let err = svc.issue_gateway(7, &quote, GatewayMethod::Sbp).await.unwrap_err();
        assert!(matches!(err, IssueError::Gateway(GatewayError::NotConfigured)));
    }
}

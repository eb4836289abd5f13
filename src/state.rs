use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::models::plan::PlanDuration;
use crate::repositories::{PaymentRepository, PromoRepository, ReferralRepository, UserRepository};
use crate::services::access_service::AccessService;
use crate::services::notification_service::Notifier;
use crate::services::pay_service::PayService;
use crate::services::reconcile_service::ReconcileService;
use crate::settings::Settings;

const SESSION_TTL: Duration = Duration::from_secs(300);

/// What the next plain-text message from a chat is expected to be.
#[derive(Debug, Clone)]
pub enum PendingInput {
    PromoCode { duration: PlanDuration },
}

/// Short-lived per-chat input expectations. Entries expire so an abandoned
/// prompt does not swallow an unrelated message days later.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<i64, (PendingInput, Instant)>>>,
}

impl SessionStore {
    pub async fn set(&self, chat_id: i64, input: PendingInput) {
        self.inner
            .lock()
            .await
            .insert(chat_id, (input, Instant::now()));
    }

    pub async fn take(&self, chat_id: i64) -> Option<PendingInput> {
        let mut map = self.inner.lock().await;
        map.retain(|_, (_, at)| at.elapsed() < SESSION_TTL);
        map.remove(&chat_id).map(|(input, _)| input)
    }

    pub async fn clear(&self, chat_id: i64) {
        self.inner.lock().await.remove(&chat_id);
    }
}

/// Everything the handlers need, cloned into the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub users: UserRepository,
    pub payments: PaymentRepository,
    pub promos: PromoRepository,
    pub referrals: ReferralRepository,
    pub api: Arc<dyn crate::api_client::Provisioner>,
    pub pay: PayService,
    pub reconcile: ReconcileService,
    pub access: AccessService,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: SessionStore,
    pub bot_username: String,
}

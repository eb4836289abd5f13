use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api_client;
mod bot;
mod db;
mod models;
mod repositories;
mod services;
mod settings;
mod state;
mod sync;
mod texts;

use crate::api_client::{ApiClient, Provisioner};
use crate::repositories::{PaymentRepository, PromoRepository, ReferralRepository, UserRepository};
use crate::services::access_service::AccessService;
use crate::services::gateway::{DisabledGateway, Gateway, YookassaClient};
use crate::services::notification_service::TelegramNotifier;
use crate::services::pay_service::PayService;
use crate::services::reconcile_service::ReconcileService;
use crate::services::referral_service::ReferralService;
use crate::services::renewal_service::RenewalService;
use crate::settings::Settings;
use crate::state::{AppState, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting Nebula bot...");

    let settings = Arc::new(Settings::from_env()?);
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://nebula.db".to_string());
    let pool = db::init_db(&database_url).await?;

    let api: Arc<dyn Provisioner> = Arc::new(ApiClient::new(
        settings.api_base_url.clone(),
        settings.api_token.clone(),
    )?);

    // A panel that is down at boot will be down for every purchase too.
    if let Err(err) = api.health().await {
        error!(error = %err, "panel health check failed, refusing to start");
        return Err(err.into());
    }
    info!("Panel is reachable");

    let gateway: Arc<dyn Gateway> = match (&settings.yookassa_shop_id, &settings.yookassa_secret_key)
    {
        (Some(shop_id), Some(secret_key)) => Arc::new(YookassaClient::new(
            shop_id.clone(),
            secret_key.clone(),
            settings.yookassa_return_url.clone(),
        )),
        _ => {
            info!("YooKassa credentials absent, gateway rail disabled");
            Arc::new(DisabledGateway)
        }
    };

    let users = UserRepository::new(pool.clone());
    let payments = PaymentRepository::new(pool.clone());
    let promos = PromoRepository::new(pool.clone());
    let referrals = ReferralRepository::new(pool);

    let bot = Bot::new(settings.bot_token.clone());
    let notifier = Arc::new(TelegramNotifier::new(
        bot.clone(),
        settings.notifications_chat_id,
        settings.notifications_topic_id,
    ));

    let referral_service = ReferralService::new(
        users.clone(),
        referrals.clone(),
        api.clone(),
        settings.referral_bonus_days,
    );
    let pay = PayService::new(payments.clone(), gateway.clone(), settings.clone());
    let reconcile = ReconcileService::new(
        users.clone(),
        payments.clone(),
        promos.clone(),
        api.clone(),
        gateway,
        referral_service.clone(),
        settings.clone(),
    );
    let access = AccessService::new(
        users.clone(),
        api.clone(),
        referral_service,
        settings.clone(),
    );
    let renewal = RenewalService::new(users.clone(), api.clone(), notifier.clone());

    let state = AppState {
        settings: settings.clone(),
        users,
        payments,
        promos,
        referrals,
        api,
        pay,
        reconcile,
        access,
        notifier,
        sessions: SessionStore::default(),
        bot_username: String::new(),
    };

    tokio::spawn(renewal.run(settings.renewal_check_hours));

    let (_tx, rx) = tokio::sync::broadcast::channel(1);
    bot::run_bot(bot, rx, state).await;
    Ok(())
}

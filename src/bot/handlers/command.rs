use teloxide::prelude::*;
use tracing::{error, info};

use crate::bot::handlers::payment;
use crate::bot::keyboards::{main_menu, method_keyboard};
use crate::models::plan::PlanDuration;
use crate::models::user::BotUser;
use crate::state::{AppState, PendingInput};
use crate::texts::{Locale, Text};

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let tg_id = msg.chat.id.0;

    if msg.successful_payment().is_some() {
        let locale = user_locale(&state, tg_id).await;
        return payment::process_successful_payment(&bot, &msg, &state, locale).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with("/start") {
        return handle_start(&bot, &msg, &state, text).await;
    }

    match text {
        "/health" | "/stats" | "/nodes" if state.settings.is_admin(tg_id) => {
            return handle_admin_command(&bot, &msg, &state, text).await;
        }
        _ => {}
    }

    // A pending prompt claims the next plain-text message.
    if let Some(PendingInput::PromoCode { duration }) = state.sessions.take(tg_id).await {
        return handle_promo_input(&bot, &msg, &state, duration, text).await;
    }

    Ok(())
}

async fn handle_start(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    let tg_id = msg.chat.id.0;
    let username = msg.from.as_ref().and_then(|u| u.username.as_deref());

    let user = match state
        .users
        .get_or_create(tg_id, username, &state.settings.default_locale)
        .await
    {
        Ok(user) => user,
        Err(err) => {
            error!(tg_id, error = %err, "user upsert failed on /start");
            return Ok(());
        }
    };

    // Deep-link referral: /start <referrer telegram id>. First link wins and
    // self-invites are ignored.
    if let Some(param) = text.strip_prefix("/start ").map(str::trim) {
        if let Ok(referrer_id) = param.parse::<i64>() {
            match state.users.set_referrer(tg_id, referrer_id).await {
                Ok(true) => info!(tg_id, referrer_id, "referral link registered"),
                Ok(false) => {}
                Err(err) => error!(tg_id, error = %err, "failed to set referrer"),
            }
        }
    }

    let locale = Locale::from_code(&user.language);
    let trial_available = !user.trial_used && user.panel_uuid.is_none();
    bot.send_message(msg.chat.id, Text::Welcome.render(locale))
        .reply_markup(main_menu(locale, trial_available))
        .await?;
    Ok(())
}

async fn handle_promo_input(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    duration: PlanDuration,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    let tg_id = msg.chat.id.0;
    let locale = user_locale(state, tg_id).await;
    let code = text.trim().to_uppercase();

    match state.promos.can_use(&code, tg_id).await {
        Ok(Ok(promo)) => {
            let quote = state.pay.resolve_quote(duration, Some(&promo));
            bot.send_message(
                msg.chat.id,
                Text::PromoApplied {
                    code: promo.code.clone(),
                    discount: promo.discount_percent,
                    bonus_days: promo.bonus_days,
                }
                .render(locale),
            )
            .await?;
            bot.send_message(
                msg.chat.id,
                Text::ChooseMethod {
                    months: duration.months(),
                    stars: quote.stars,
                    rub: quote.rub,
                }
                .render(locale),
            )
            .reply_markup(method_keyboard(
                locale,
                &quote,
                state.settings.yookassa_shop_id.is_some(),
            ))
            .await?;
        }
        Ok(Err(rejection)) => {
            bot.send_message(msg.chat.id, Text::PromoRejected(rejection).render(locale))
                .await?;
        }
        Err(err) => {
            error!(tg_id, error = %err, "promo validation failed");
            bot.send_message(msg.chat.id, Text::SomethingWentWrong.render(locale))
                .await?;
        }
    }
    Ok(())
}

async fn handle_admin_command(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    command: &str,
) -> Result<(), teloxide::RequestError> {
    let report = match command {
        "/health" => match state.api.health().await {
            Ok(()) => "✅ Panel is reachable".to_string(),
            Err(err) => format!("❌ Panel health check failed: {err}"),
        },
        "/stats" => match state.api.stats().await {
            Ok(stats) => format!(
                "📊 Panel stats\nOnline now: {}\nTotal users: {}\nActive connections: {}",
                stats.online_now, stats.total_users, stats.active_connections
            ),
            Err(err) => format!("❌ Stats unavailable: {err}"),
        },
        "/nodes" => match state.api.nodes().await {
            Ok(nodes) if nodes.is_empty() => "No nodes registered".to_string(),
            Ok(nodes) => nodes
                .iter()
                .map(|n| {
                    let mark = if n.is_disabled {
                        "⏸"
                    } else if n.is_connected {
                        "🟢"
                    } else {
                        "🔴"
                    };
                    format!("{mark} {}", n.name)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(err) => format!("❌ Nodes unavailable: {err}"),
        },
        _ => return Ok(()),
    };
    bot.send_message(msg.chat.id, report).await?;
    Ok(())
}

pub(crate) async fn user_locale(state: &AppState, tg_id: i64) -> Locale {
    match state.users.get(tg_id).await {
        Ok(Some(BotUser { language, .. })) => Locale::from_code(&language),
        _ => Locale::from_code(&state.settings.default_locale),
    }
}

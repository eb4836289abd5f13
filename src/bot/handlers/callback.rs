use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, LabeledPrice};
use tracing::{error, info};

use crate::bot::handlers::command::user_locale;
use crate::bot::handlers::payment::process_gateway_check;
use crate::bot::keyboards::{
    check_payment_keyboard, language_keyboard, main_menu, method_keyboard, plans_keyboard,
    settings_keyboard,
};
use crate::models::plan::PlanDuration;
use crate::services::access_service::{AccessInfo, TrialOutcome};
use crate::services::gateway::{GatewayError, GatewayMethod};
use crate::services::notification_service::trial_report;
use crate::services::pay_service::IssueError;
use crate::state::{AppState, PendingInput};
use crate::texts::{Locale, Text};

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();
    let tg_id = q.from.id.0 as i64;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(tg_id));

    let Some(data) = q.data else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };
    let locale = user_locale(&state, tg_id).await;
    let _ = bot.answer_callback_query(callback_id).await;

    match data.as_str() {
        "nav:main" => {
            state.sessions.clear(tg_id).await;
            let trial_available = match state.users.get(tg_id).await {
                Ok(Some(user)) => !user.trial_used && user.panel_uuid.is_none(),
                _ => false,
            };
            bot.send_message(chat_id, Text::Welcome.render(locale))
                .reply_markup(main_menu(locale, trial_available))
                .await?;
        }

        "user:connect" => {
            bot.send_message(chat_id, Text::ChoosePlan.render(locale))
                .reply_markup(plans_keyboard(locale, &state.settings))
                .await?;
        }

        "user:trial" => {
            handle_trial(&bot, chat_id, tg_id, &state, locale).await?;
        }

        "user:my_access" => {
            handle_my_access(&bot, chat_id, tg_id, &state, locale).await?;
        }

        "user:settings" => {
            let auto_renewal = match state.users.get(tg_id).await {
                Ok(Some(user)) => user.auto_renewal,
                _ => true,
            };
            bot.send_message(chat_id, Text::Settings.render(locale))
                .reply_markup(settings_keyboard(locale, auto_renewal))
                .await?;
        }

        "user:change_language" => {
            bot.send_message(chat_id, Text::Settings.render(locale))
                .reply_markup(language_keyboard())
                .await?;
        }

        "user:referral" => {
            let link = format!("https://t.me/{}?start={}", state.bot_username, tg_id);
            let summary = state.referrals.summary_for(tg_id).await.unwrap_or_default();
            bot.send_message(
                chat_id,
                Text::ReferralInfo {
                    link,
                    invited: summary.invited,
                    bonus_days: summary.bonus_days,
                }
                .render(locale),
            )
            .await?;
        }

        "lang:ru" | "lang:en" => {
            let code = data.strip_prefix("lang:").unwrap_or("ru");
            if let Err(err) = state.users.update_language(tg_id, code).await {
                error!(tg_id, error = %err, "language update failed");
            }
            let locale = Locale::from_code(code);
            bot.send_message(chat_id, Text::LanguageChanged.render(locale))
                .await?;
        }

        "auto_renewal:toggle" => {
            let enabled = match state.users.get(tg_id).await {
                Ok(Some(user)) => !user.auto_renewal,
                _ => true,
            };
            if let Err(err) = state.users.set_auto_renewal(tg_id, enabled).await {
                error!(tg_id, error = %err, "auto-renewal toggle failed");
            }
            bot.send_message(chat_id, Text::AutoRenewal { enabled }.render(locale))
                .reply_markup(settings_keyboard(locale, enabled))
                .await?;
        }

        check if check.starts_with("yookassa:check:") => {
            let gateway_id = check.trim_start_matches("yookassa:check:");
            process_gateway_check(&bot, chat_id, gateway_id, &state, locale).await?;
        }

        purchase if purchase.starts_with("purchase:") => {
            handle_purchase(&bot, chat_id, tg_id, &state, locale, purchase).await?;
        }

        other => {
            info!("Unhandled callback data: {}", other);
        }
    }

    Ok(())
}

/// `purchase:<months>[:<action>[:<promo code>]]` where action is one of
/// `stars`, `card`, `sbp`, `promo`.
async fn handle_purchase(
    bot: &Bot,
    chat_id: ChatId,
    tg_id: i64,
    state: &AppState,
    locale: Locale,
    data: &str,
) -> Result<(), teloxide::RequestError> {
    let mut parts = data.splitn(4, ':').skip(1);
    let months: i64 = parts.next().and_then(|m| m.parse().ok()).unwrap_or(1);
    let duration = PlanDuration::from_months(months);
    let action = parts.next();
    let promo_code = parts.next();

    let promo = match promo_code {
        Some(code) => match state.promos.can_use(code, tg_id).await {
            Ok(Ok(promo)) => Some(promo),
            Ok(Err(rejection)) => {
                bot.send_message(chat_id, Text::PromoRejected(rejection).render(locale))
                    .await?;
                return Ok(());
            }
            Err(err) => {
                error!(tg_id, error = %err, "promo re-validation failed");
                bot.send_message(chat_id, Text::SomethingWentWrong.render(locale))
                    .await?;
                return Ok(());
            }
        },
        None => None,
    };
    let quote = state.pay.resolve_quote(duration, promo.as_ref());

    match action {
        None => {
            bot.send_message(
                chat_id,
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

        Some("promo") => {
            state
                .sessions
                .set(tg_id, PendingInput::PromoCode { duration })
                .await;
            bot.send_message(chat_id, Text::PromoPrompt.render(locale))
                .await?;
        }

        Some("stars") => {
            send_stars_invoice(bot, chat_id, tg_id, state, locale, &quote).await?;
        }

        Some("card") | Some("sbp") => {
            let method = if action == Some("card") {
                GatewayMethod::Card
            } else {
                GatewayMethod::Sbp
            };
            send_gateway_payment(bot, chat_id, tg_id, state, locale, &quote, method).await?;
        }

        Some(other) => {
            info!("Unhandled purchase action: {}", other);
        }
    }
    Ok(())
}

async fn send_stars_invoice(
    bot: &Bot,
    chat_id: ChatId,
    tg_id: i64,
    state: &AppState,
    locale: Locale,
    quote: &crate::services::pricing::Quote,
) -> Result<(), teloxide::RequestError> {
    let intent = match state.pay.issue_stars(tg_id, quote).await {
        Ok(intent) => intent,
        Err(err) => {
            error!(tg_id, error = %err, "failed to issue stars invoice");
            bot.send_message(chat_id, Text::SomethingWentWrong.render(locale))
                .await?;
            return Ok(());
        }
    };

    let prices = vec![LabeledPrice {
        label: Text::InvoiceTitle {
            months: quote.duration.months(),
        }
        .render(locale),
        amount: intent.quote.stars,
    }];
    bot.send_invoice(
        chat_id,
        Text::InvoiceTitle {
            months: quote.duration.months(),
        }
        .render(locale),
        Text::InvoiceDescription {
            days: quote.days + quote.bonus_days,
        }
        .render(locale),
        intent.payload,
        "XTR",
        prices,
    )
    .await?;
    Ok(())
}

async fn send_gateway_payment(
    bot: &Bot,
    chat_id: ChatId,
    tg_id: i64,
    state: &AppState,
    locale: Locale,
    quote: &crate::services::pricing::Quote,
    method: GatewayMethod,
) -> Result<(), teloxide::RequestError> {
    match state.pay.issue_gateway(tg_id, quote, method).await {
        Ok(intent) => {
            let text = match &intent.confirmation_url {
                Some(url) => Text::GatewayLink {
                    rub: quote.rub,
                    url: url.clone(),
                }
                .render(locale),
                None => Text::GatewayPending.render(locale),
            };
            bot.send_message(chat_id, text)
                .reply_markup(check_payment_keyboard(locale, &intent.gateway_payment_id))
                .await?;
        }
        Err(IssueError::Gateway(GatewayError::NotConfigured)) => {
            bot.send_message(chat_id, Text::GatewayUnavailable.render(locale))
                .await?;
        }
        Err(err) => {
            error!(tg_id, error = %err, "failed to issue gateway payment");
            bot.send_message(chat_id, Text::SomethingWentWrong.render(locale))
                .await?;
        }
    }
    Ok(())
}

async fn handle_trial(
    bot: &Bot,
    chat_id: ChatId,
    tg_id: i64,
    state: &AppState,
    locale: Locale,
) -> Result<(), teloxide::RequestError> {
    let user = match state.users.get(tg_id).await {
        Ok(Some(user)) => user,
        _ => return Ok(()),
    };
    match state.access.activate_trial(&user).await {
        Ok(TrialOutcome::Activated {
            days,
            expiry,
            link,
            referral_granted,
        }) => {
            bot.send_message(
                chat_id,
                Text::TrialActivated { days, expiry, link }.render(locale),
            )
            .await?;
            let _ = state
                .notifier
                .notify_admins(trial_report(tg_id, days, referral_granted))
                .await;
        }
        Ok(TrialOutcome::AlreadyUsed) | Ok(TrialOutcome::NotEligible) => {
            bot.send_message(chat_id, Text::TrialAlreadyUsed.render(locale))
                .await?;
        }
        Err(err) => {
            error!(tg_id, error = %err, "trial activation failed");
            bot.send_message(chat_id, Text::SomethingWentWrong.render(locale))
                .await?;
        }
    }
    Ok(())
}

async fn handle_my_access(
    bot: &Bot,
    chat_id: ChatId,
    tg_id: i64,
    state: &AppState,
    locale: Locale,
) -> Result<(), teloxide::RequestError> {
    let user = match state.users.get(tg_id).await {
        Ok(Some(user)) => user,
        _ => return Ok(()),
    };
    match state.access.access_info(&user).await {
        Ok(AccessInfo::Active { expiry, link }) => {
            let text = match expiry {
                Some(expiry) => Text::AccessActive { expiry, link }.render(locale),
                None => Text::AccessNone.render(locale),
            };
            bot.send_message(chat_id, text).await?;
        }
        Ok(AccessInfo::None) => {
            bot.send_message(chat_id, Text::AccessNone.render(locale))
                .await?;
        }
        Err(err) => {
            error!(tg_id, error = %err, "access lookup failed");
            bot.send_message(chat_id, Text::SomethingWentWrong.render(locale))
                .await?;
        }
    }
    Ok(())
}

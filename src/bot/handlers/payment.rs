use teloxide::prelude::*;
use teloxide::types::{Message, PreCheckoutQuery};
use tracing::{error, info};

use crate::services::notification_service::payment_report;
use crate::services::reconcile_service::{ReconcileError, ReconcileOutcome};
use crate::state::AppState;
use crate::texts::{Locale, Text};

/// Runs before Telegram charges the user. Rejecting here is free, so every
/// validation problem is caught at this gate.
pub async fn pre_checkout_handler(
    bot: Bot,
    q: PreCheckoutQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    match state
        .reconcile
        .precheck_stars(&q.invoice_payload, q.total_amount as u32)
        .await
    {
        Ok(()) => {
            bot.answer_pre_checkout_query(q.id, true).await?;
        }
        Err(err) => {
            info!(user_id = q.from.id.0, error = %err, "pre-checkout rejected");
            bot.answer_pre_checkout_query(q.id, false)
                .error_message("This invoice is no longer valid. Start the purchase again.")
                .await?;
        }
    }
    Ok(())
}

/// Stars settlement after the charge went through.
pub async fn process_successful_payment(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    locale: Locale,
) -> Result<(), teloxide::RequestError> {
    let Some(payment) = msg.successful_payment() else {
        return Ok(());
    };
    let stars = payment.total_amount as u32;
    info!(chat_id = msg.chat.id.0, stars, "processing stars payment");

    match state
        .reconcile
        .confirm_stars(&payment.invoice_payload, stars)
        .await
    {
        Ok(ReconcileOutcome::Settled(receipt)) => {
            bot.send_message(
                msg.chat.id,
                Text::PaymentSettled {
                    days: receipt.days,
                    expiry: receipt.new_expiry,
                    link: receipt.subscription_url.clone(),
                }
                .render(locale),
            )
            .await?;
            let _ = state
                .notifier
                .notify_admins(payment_report(&receipt, "stars", &format!("{stars} ⭐")))
                .await;
        }
        Ok(ReconcileOutcome::AlreadySettled) => {
            bot.send_message(msg.chat.id, Text::PaymentAlreadySettled.render(locale))
                .await?;
        }
        Ok(_) => {}
        Err(err) => {
            // The row stays pending, support can replay the settlement.
            error!(chat_id = msg.chat.id.0, error = %err, "stars settlement failed");
            bot.send_message(msg.chat.id, Text::SomethingWentWrong.render(locale))
                .await?;
        }
    }
    Ok(())
}

/// "Check payment" button on the gateway rail.
pub async fn process_gateway_check(
    bot: &Bot,
    chat_id: ChatId,
    gateway_payment_id: &str,
    state: &AppState,
    locale: Locale,
) -> Result<(), teloxide::RequestError> {
    match state.reconcile.confirm_gateway(gateway_payment_id).await {
        Ok(ReconcileOutcome::Settled(receipt)) => {
            bot.send_message(
                chat_id,
                Text::PaymentSettled {
                    days: receipt.days,
                    expiry: receipt.new_expiry,
                    link: receipt.subscription_url.clone(),
                }
                .render(locale),
            )
            .await?;
            let amount = state
                .payments
                .get_by_gateway_id(gateway_payment_id)
                .await
                .ok()
                .flatten()
                .map(|p| format!("{:.2} RUB", p.amount_rub))
                .unwrap_or_default();
            let _ = state
                .notifier
                .notify_admins(payment_report(&receipt, "gateway", &amount))
                .await;
        }
        Ok(ReconcileOutcome::AlreadySettled) => {
            bot.send_message(chat_id, Text::PaymentAlreadySettled.render(locale))
                .await?;
        }
        Ok(ReconcileOutcome::StillPending) => {
            bot.send_message(chat_id, Text::GatewayPending.render(locale))
                .await?;
        }
        Ok(ReconcileOutcome::Canceled) => {
            bot.send_message(chat_id, Text::GatewayCanceled.render(locale))
                .await?;
        }
        Err(ReconcileError::NotPending) => {
            bot.send_message(chat_id, Text::GatewayCanceled.render(locale))
                .await?;
        }
        Err(err) => {
            error!(chat_id = chat_id.0, error = %err, "gateway check failed");
            bot.send_message(chat_id, Text::SomethingWentWrong.render(locale))
                .await?;
        }
    }
    Ok(())
}

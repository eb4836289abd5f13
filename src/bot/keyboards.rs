use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::models::plan::PlanDuration;
use crate::services::pricing::Quote;
use crate::settings::Settings;
use crate::texts::{Locale, Text};

pub fn main_menu(locale: Locale, trial_available: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![InlineKeyboardButton::callback(
        Text::BtnConnect.render(locale),
        "user:connect",
    )]];
    if trial_available {
        rows.push(vec![InlineKeyboardButton::callback(
            Text::BtnTrial.render(locale),
            "user:trial",
        )]);
    }
    rows.push(vec![
        InlineKeyboardButton::callback(Text::BtnMyAccess.render(locale), "user:my_access"),
        InlineKeyboardButton::callback(Text::BtnSettings.render(locale), "user:settings"),
    ]);
    rows.push(vec![InlineKeyboardButton::callback(
        Text::BtnReferral.render(locale),
        "user:referral",
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub fn plans_keyboard(locale: Locale, settings: &Settings) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for duration in PlanDuration::ALL {
        let label = Text::PlanLabel {
            months: duration.months(),
            stars: settings.stars_price(duration) as u32,
            rub: settings.rub_price(duration),
        }
        .render(locale);
        rows.push(vec![InlineKeyboardButton::callback(
            label,
            format!("purchase:{}", duration.months()),
        )]);
    }
    rows.push(back_row(locale));
    InlineKeyboardMarkup::new(rows)
}

/// Method picker for one plan. When a promo is applied its code rides along
/// in the callback data so the final purchase keeps the discount.
pub fn method_keyboard(locale: Locale, quote: &Quote, gateway_enabled: bool) -> InlineKeyboardMarkup {
    let months = quote.duration.months();
    let suffix = match &quote.promo_code {
        Some(code) => format!(":{code}"),
        None => String::new(),
    };

    let mut rows = vec![vec![InlineKeyboardButton::callback(
        Text::BtnPayStars { stars: quote.stars }.render(locale),
        format!("purchase:{months}:stars{suffix}"),
    )]];
    if gateway_enabled {
        rows.push(vec![
            InlineKeyboardButton::callback(
                Text::BtnPayCard { rub: quote.rub }.render(locale),
                format!("purchase:{months}:card{suffix}"),
            ),
            InlineKeyboardButton::callback(
                Text::BtnPaySbp { rub: quote.rub }.render(locale),
                format!("purchase:{months}:sbp{suffix}"),
            ),
        ]);
    }
    if quote.promo_code.is_none() {
        rows.push(vec![InlineKeyboardButton::callback(
            Text::BtnPromo.render(locale),
            format!("purchase:{months}:promo"),
        )]);
    }
    rows.push(back_row(locale));
    InlineKeyboardMarkup::new(rows)
}

pub fn check_payment_keyboard(locale: Locale, gateway_payment_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            Text::BtnCheckPayment.render(locale),
            format!("yookassa:check:{gateway_payment_id}"),
        )],
        back_row(locale),
    ])
}

pub fn settings_keyboard(locale: Locale, auto_renewal: bool) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            Text::BtnLanguage.render(locale),
            "user:change_language",
        )],
        vec![InlineKeyboardButton::callback(
            Text::BtnAutoRenewal {
                enabled: auto_renewal,
            }
            .render(locale),
            "auto_renewal:toggle",
        )],
        back_row(locale),
    ])
}

pub fn language_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🇷🇺 Русский", "lang:ru"),
        InlineKeyboardButton::callback("🇺🇸 English", "lang:en"),
    ]])
}

pub fn back_row(locale: Locale) -> Vec<InlineKeyboardButton> {
    vec![InlineKeyboardButton::callback(
        Text::BtnBack.render(locale),
        "nav:main",
    )]
}

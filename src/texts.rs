use chrono::{DateTime, Utc};

use crate::models::promo::PromoRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    Ru,
    En,
}

impl Locale {
    pub fn from_code(code: &str) -> Self {
        match code {
            "en" => Locale::En,
            _ => Locale::Ru,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Locale::Ru => "ru",
            Locale::En => "en",
        }
    }
}

/// Every user-visible string. A message that does not exist here cannot be
/// sent, and a missing translation is a compile error, not a runtime KeyError.
#[derive(Debug, Clone)]
pub enum Text {
    Welcome,
    ChoosePlan,
    ChooseMethod { months: i64, stars: u32, rub: f64 },
    PlanLabel { months: i64, stars: u32, rub: f64 },
    PromoPrompt,
    PromoApplied { code: String, discount: i64, bonus_days: i64 },
    PromoRejected(PromoRejection),
    InvoiceTitle { months: i64 },
    InvoiceDescription { days: i64 },
    PaymentSettled { days: i64, expiry: DateTime<Utc>, link: Option<String> },
    PaymentAlreadySettled,
    GatewayPending,
    GatewayCanceled,
    GatewayLink { rub: f64, url: String },
    GatewayUnavailable,
    TrialActivated { days: i64, expiry: DateTime<Utc>, link: Option<String> },
    TrialAlreadyUsed,
    AccessActive { expiry: DateTime<Utc>, link: Option<String> },
    AccessNone,
    Settings,
    LanguageChanged,
    AutoRenewal { enabled: bool },
    ReferralInfo { link: String, invited: i64, bonus_days: i64 },
    RenewalEarly { days_left: i64 },
    RenewalUrgent,
    RenewalExpired,
    SomethingWentWrong,

    BtnConnect,
    BtnTrial,
    BtnMyAccess,
    BtnSettings,
    BtnReferral,
    BtnBack,
    BtnPayStars { stars: u32 },
    BtnPayCard { rub: f64 },
    BtnPaySbp { rub: f64 },
    BtnPromo,
    BtnCheckPayment,
    BtnLanguage,
    BtnAutoRenewal { enabled: bool },
}

impl Text {
    pub fn render(&self, locale: Locale) -> String {
        match locale {
            Locale::Ru => self.render_ru(),
            Locale::En => self.render_en(),
        }
    }

    fn render_ru(&self) -> String {
        match self {
            Text::Welcome => {
                "Добро пожаловать! Здесь можно подключить VPN, продлить доступ и следить за подпиской.".to_string()
            }
            Text::ChoosePlan => "Выберите срок подписки:".to_string(),
            Text::ChooseMethod { months, stars, rub } => format!(
                "Подписка на {months} мес. Стоимость: {stars} ⭐ или {rub:.0} ₽.\nВыберите способ оплаты:"
            ),
            Text::PlanLabel { months, stars, rub } => {
                format!("{months} мес — {stars} ⭐ / {rub:.0} ₽")
            }
            Text::PromoPrompt => "Отправьте промокод сообщением:".to_string(),
            Text::PromoApplied { code, discount, bonus_days } => {
                let mut line = format!("Промокод {code} применён: скидка {discount}%");
                if *bonus_days > 0 {
                    line.push_str(&format!(", +{bonus_days} дн. бонусом"));
                }
                line
            }
            Text::PromoRejected(why) => match why {
                PromoRejection::NotFound => "Такого промокода нет.".to_string(),
                PromoRejection::Expired => "Срок действия промокода истёк.".to_string(),
                PromoRejection::Exhausted => "Лимит использований промокода исчерпан.".to_string(),
                PromoRejection::AlreadyUsed => "Вы уже использовали этот промокод.".to_string(),
            },
            Text::InvoiceTitle { months } => format!("VPN на {months} мес."),
            Text::InvoiceDescription { days } => {
                format!("Доступ к VPN на {days} дней")
            }
            Text::PaymentSettled { days, expiry, link } => {
                let mut msg = format!(
                    "Оплата прошла! Подписка продлена на {days} дн., действует до {}.",
                    expiry.format("%d.%m.%Y")
                );
                if let Some(link) = link {
                    msg.push_str(&format!("\n\nВаша ссылка: {link}"));
                }
                msg
            }
            Text::PaymentAlreadySettled => "Этот платёж уже учтён.".to_string(),
            Text::GatewayPending => {
                "Платёж ещё не подтверждён. Попробуйте проверить через минуту.".to_string()
            }
            Text::GatewayCanceled => "Платёж отменён.".to_string(),
            Text::GatewayLink { rub, url } => {
                format!("К оплате {rub:.2} ₽. Перейдите по ссылке:\n{url}")
            }
            Text::GatewayUnavailable => "Оплата картой сейчас недоступна.".to_string(),
            Text::TrialActivated { days, expiry, link } => {
                let mut msg = format!(
                    "Пробный период на {days} дн. активирован, до {}.",
                    expiry.format("%d.%m.%Y")
                );
                if let Some(link) = link {
                    msg.push_str(&format!("\n\nВаша ссылка: {link}"));
                }
                msg
            }
            Text::TrialAlreadyUsed => "Пробный период уже был использован.".to_string(),
            Text::AccessActive { expiry, link } => {
                let mut msg = format!("Подписка активна до {}.", expiry.format("%d.%m.%Y"));
                if let Some(link) = link {
                    msg.push_str(&format!("\n\nВаша ссылка: {link}"));
                }
                msg
            }
            Text::AccessNone => "У вас пока нет активной подписки.".to_string(),
            Text::Settings => "Настройки:".to_string(),
            Text::LanguageChanged => "Язык переключён.".to_string(),
            Text::AutoRenewal { enabled } => {
                if *enabled {
                    "Напоминания о продлении включены.".to_string()
                } else {
                    "Напоминания о продлении выключены.".to_string()
                }
            }
            Text::ReferralInfo { link, invited, bonus_days } => format!(
                "Приглашайте друзей и получайте бонусные дни.\n\nВаша ссылка: {link}\nПриглашено: {invited}\nНачислено дней: {bonus_days}"
            ),
            Text::RenewalEarly { days_left } => format!(
                "Подписка закончится через {days_left} дн. Продлите заранее, чтобы не потерять доступ."
            ),
            Text::RenewalUrgent => {
                "Подписка закончится меньше чем через сутки. Самое время продлить.".to_string()
            }
            Text::RenewalExpired => {
                "Подписка закончилась. Продлите, чтобы восстановить доступ.".to_string()
            }
            Text::SomethingWentWrong => {
                "Что-то пошло не так. Попробуйте ещё раз позже.".to_string()
            }

            Text::BtnConnect => "🔌 Подключить".to_string(),
            Text::BtnTrial => "🎁 Пробный период".to_string(),
            Text::BtnMyAccess => "🔑 Мой доступ".to_string(),
            Text::BtnSettings => "⚙️ Настройки".to_string(),
            Text::BtnReferral => "👥 Пригласить друга".to_string(),
            Text::BtnBack => "⬅️ Назад".to_string(),
            Text::BtnPayStars { stars } => format!("⭐ Оплатить {stars} Stars"),
            Text::BtnPayCard { rub } => format!("💳 Картой, {rub:.0} ₽"),
            Text::BtnPaySbp { rub } => format!("🏦 СБП, {rub:.0} ₽"),
            Text::BtnPromo => "🎟 Ввести промокод".to_string(),
            Text::BtnCheckPayment => "🔄 Проверить оплату".to_string(),
            Text::BtnLanguage => "🌐 Язык: русский".to_string(),
            Text::BtnAutoRenewal { enabled } => {
                if *enabled {
                    "🔔 Напоминания: вкл".to_string()
                } else {
                    "🔕 Напоминания: выкл".to_string()
                }
            }
        }
    }

    fn render_en(&self) -> String {
        match self {
            Text::Welcome => {
                "Welcome! Connect a VPN, extend your access and keep an eye on the subscription here.".to_string()
            }
            Text::ChoosePlan => "Pick a subscription length:".to_string(),
            Text::ChooseMethod { months, stars, rub } => format!(
                "{months}-month subscription. Price: {stars} ⭐ or {rub:.0} RUB.\nPick a payment method:"
            ),
            Text::PlanLabel { months, stars, rub } => {
                format!("{months} mo — {stars} ⭐ / {rub:.0} RUB")
            }
            Text::PromoPrompt => "Send the promo code as a message:".to_string(),
            Text::PromoApplied { code, discount, bonus_days } => {
                let mut line = format!("Promo code {code} applied: {discount}% off");
                if *bonus_days > 0 {
                    line.push_str(&format!(", +{bonus_days} bonus days"));
                }
                line
            }
            Text::PromoRejected(why) => match why {
                PromoRejection::NotFound => "No such promo code.".to_string(),
                PromoRejection::Expired => "This promo code has expired.".to_string(),
                PromoRejection::Exhausted => "This promo code is used up.".to_string(),
                PromoRejection::AlreadyUsed => "You have already used this promo code.".to_string(),
            },
            Text::InvoiceTitle { months } => format!("VPN for {months} mo."),
            Text::InvoiceDescription { days } => format!("VPN access for {days} days"),
            Text::PaymentSettled { days, expiry, link } => {
                let mut msg = format!(
                    "Payment received! Subscription extended by {days} days, active until {}.",
                    expiry.format("%d.%m.%Y")
                );
                if let Some(link) = link {
                    msg.push_str(&format!("\n\nYour link: {link}"));
                }
                msg
            }
            Text::PaymentAlreadySettled => "This payment was already counted.".to_string(),
            Text::GatewayPending => {
                "The payment is not confirmed yet. Check again in a minute.".to_string()
            }
            Text::GatewayCanceled => "The payment was canceled.".to_string(),
            Text::GatewayLink { rub, url } => {
                format!("{rub:.2} RUB to pay. Follow the link:\n{url}")
            }
            Text::GatewayUnavailable => "Card payments are unavailable right now.".to_string(),
            Text::TrialActivated { days, expiry, link } => {
                let mut msg = format!(
                    "Trial for {days} days activated, until {}.",
                    expiry.format("%d.%m.%Y")
                );
                if let Some(link) = link {
                    msg.push_str(&format!("\n\nYour link: {link}"));
                }
                msg
            }
            Text::TrialAlreadyUsed => "The trial was already used.".to_string(),
            Text::AccessActive { expiry, link } => {
                let mut msg = format!("Subscription active until {}.", expiry.format("%d.%m.%Y"));
                if let Some(link) = link {
                    msg.push_str(&format!("\n\nYour link: {link}"));
                }
                msg
            }
            Text::AccessNone => "You have no active subscription yet.".to_string(),
            Text::Settings => "Settings:".to_string(),
            Text::LanguageChanged => "Language switched.".to_string(),
            Text::AutoRenewal { enabled } => {
                if *enabled {
                    "Renewal reminders are on.".to_string()
                } else {
                    "Renewal reminders are off.".to_string()
                }
            }
            Text::ReferralInfo { link, invited, bonus_days } => format!(
                "Invite friends and earn bonus days.\n\nYour link: {link}\nInvited: {invited}\nDays earned: {bonus_days}"
            ),
            Text::RenewalEarly { days_left } => format!(
                "Your subscription ends in {days_left} days. Renew early to keep your access."
            ),
            Text::RenewalUrgent => {
                "Your subscription ends in less than a day. Time to renew.".to_string()
            }
            Text::RenewalExpired => {
                "Your subscription has ended. Renew to restore access.".to_string()
            }
            Text::SomethingWentWrong => "Something went wrong. Try again later.".to_string(),

            Text::BtnConnect => "🔌 Connect".to_string(),
            Text::BtnTrial => "🎁 Free trial".to_string(),
            Text::BtnMyAccess => "🔑 My access".to_string(),
            Text::BtnSettings => "⚙️ Settings".to_string(),
            Text::BtnReferral => "👥 Invite a friend".to_string(),
            Text::BtnBack => "⬅️ Back".to_string(),
            Text::BtnPayStars { stars } => format!("⭐ Pay {stars} Stars"),
            Text::BtnPayCard { rub } => format!("💳 Card, {rub:.0} RUB"),
            Text::BtnPaySbp { rub } => format!("🏦 SBP, {rub:.0} RUB"),
            Text::BtnPromo => "🎟 Enter promo code".to_string(),
            Text::BtnCheckPayment => "🔄 Check payment".to_string(),
            Text::BtnLanguage => "🌐 Language: English".to_string(),
            Text::BtnAutoRenewal { enabled } => {
                if *enabled {
                    "🔔 Reminders: on".to_string()
                } else {
                    "🔕 Reminders: off".to_string()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_fallback_is_russian() {
        assert_eq!(Locale::from_code("en"), Locale::En);
        assert_eq!(Locale::from_code("de"), Locale::Ru);
        assert_eq!(Locale::from_code(""), Locale::Ru);
    }

    #[test]
    fn promo_applied_mentions_bonus_only_when_present() {
        let with_bonus = Text::PromoApplied {
            code: "X".to_string(),
            discount: 10,
            bonus_days: 5,
        }
        .render(Locale::En);
        assert!(with_bonus.contains("bonus days"));

        let without = Text::PromoApplied {
            code: "X".to_string(),
            discount: 10,
            bonus_days: 0,
        }
        .render(Locale::En);
        assert!(!without.contains("bonus"));
    }

    #[test]
    fn settlement_message_embeds_link() {
        let msg = Text::PaymentSettled {
            days: 30,
            expiry: Utc::now(),
            link: Some("https://sub/u".to_string()),
        }
        .render(Locale::Ru);
        assert!(msg.contains("https://sub/u"));
    }
}

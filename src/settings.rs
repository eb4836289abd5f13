use std::env;

use anyhow::{Context, Result};

use crate::models::plan::PlanDuration;

/// Runtime configuration, read once at startup from the environment
/// (a `.env` file is honored via dotenvy before this runs).
#[derive(Debug, Clone)]
pub struct Settings {
    pub bot_token: String,
    pub api_base_url: String,
    pub api_token: String,
    pub admin_ids: Vec<i64>,

    pub default_locale: String,
    pub notifications_chat_id: Option<i64>,
    pub notifications_topic_id: Option<i32>,

    // Telegram Stars prices, whole stars per plan.
    pub stars_1m: i64,
    pub stars_3m: i64,
    pub stars_6m: i64,
    pub stars_12m: i64,

    // Gateway (RUB) prices per plan.
    pub rub_1m: f64,
    pub rub_3m: f64,
    pub rub_6m: f64,
    pub rub_12m: f64,

    pub yookassa_shop_id: Option<String>,
    pub yookassa_secret_key: Option<String>,
    pub yookassa_return_url: String,

    pub trial_days: i64,
    pub referral_bonus_days: i64,
    pub renewal_check_hours: u64,

    pub internal_squads: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN is not set")?;
        let api_base_url = env::var("API_BASE_URL").context("API_BASE_URL is not set")?;
        let api_token = env::var("API_TOKEN").context("API_TOKEN is not set")?;

        let admin_ids = parse_id_list(&env::var("ADMINS").unwrap_or_default());

        Ok(Self {
            bot_token,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_token,
            admin_ids,
            default_locale: env::var("DEFAULT_LOCALE").unwrap_or_else(|_| "ru".to_string()),
            notifications_chat_id: opt_var("NOTIFICATIONS_CHAT_ID"),
            notifications_topic_id: opt_var("NOTIFICATIONS_TOPIC_ID"),
            stars_1m: var_or("SUBSCRIPTION_STARS_1MONTH", 100),
            stars_3m: var_or("SUBSCRIPTION_STARS_3MONTHS", 250),
            stars_6m: var_or("SUBSCRIPTION_STARS_6MONTHS", 450),
            stars_12m: var_or("SUBSCRIPTION_STARS_12MONTHS", 800),
            rub_1m: var_or("SUBSCRIPTION_RUB_1MONTH", 100.0),
            rub_3m: var_or("SUBSCRIPTION_RUB_3MONTHS", 250.0),
            rub_6m: var_or("SUBSCRIPTION_RUB_6MONTHS", 450.0),
            rub_12m: var_or("SUBSCRIPTION_RUB_12MONTHS", 800.0),
            yookassa_shop_id: env::var("YOOKASSA_SHOP_ID").ok().filter(|v| !v.is_empty()),
            yookassa_secret_key: env::var("YOOKASSA_SECRET_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            yookassa_return_url: env::var("YOOKASSA_RETURN_URL")
                .unwrap_or_else(|_| "https://t.me".to_string()),
            trial_days: var_or("TRIAL_DAYS", 3),
            referral_bonus_days: var_or("REFERRAL_BONUS_DAYS", 3),
            renewal_check_hours: var_or("RENEWAL_CHECK_HOURS", 6),
            internal_squads: parse_squads(&env::var("DEFAULT_INTERNAL_SQUADS").unwrap_or_default()),
        })
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        self.admin_ids.contains(&telegram_id)
    }

    pub fn stars_price(&self, duration: PlanDuration) -> i64 {
        match duration {
            PlanDuration::OneMonth => self.stars_1m,
            PlanDuration::ThreeMonths => self.stars_3m,
            PlanDuration::SixMonths => self.stars_6m,
            PlanDuration::TwelveMonths => self.stars_12m,
        }
    }

    pub fn rub_price(&self, duration: PlanDuration) -> f64 {
        match duration {
            PlanDuration::OneMonth => self.rub_1m,
            PlanDuration::ThreeMonths => self.rub_3m,
            PlanDuration::SixMonths => self.rub_6m,
            PlanDuration::TwelveMonths => self.rub_12m,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bot_token: "test".to_string(),
            api_base_url: "http://localhost".to_string(),
            api_token: "token".to_string(),
            admin_ids: vec![1],
            default_locale: "ru".to_string(),
            notifications_chat_id: None,
            notifications_topic_id: None,
            stars_1m: 100,
            stars_3m: 250,
            stars_6m: 450,
            stars_12m: 800,
            rub_1m: 100.0,
            rub_3m: 250.0,
            rub_6m: 450.0,
            rub_12m: 800.0,
            yookassa_shop_id: None,
            yookassa_secret_key: None,
            yookassa_return_url: "https://t.me".to_string(),
            trial_days: 3,
            referral_bonus_days: 3,
            renewal_check_hours: 6,
            internal_squads: Vec::new(),
        }
    }
}

fn var_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn opt_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// The squad list is configured either as a JSON array or as CSV.
fn parse_squads(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        match value {
            serde_json::Value::Array(items) => {
                return items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            }
            serde_json::Value::String(s) => return vec![s],
            _ => {}
        }
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

use crate::models::plan::PlanDuration;
use crate::models::promo::PromoCode;
use crate::settings::Settings;

/// A fully resolved price for one purchase, promo already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub duration: PlanDuration,
    pub days: i64,
    pub stars: u32,
    pub rub: f64,
    pub bonus_days: i64,
    pub promo_code: Option<String>,
    pub discount_percent: i64,
}

/// Stars are integral, the discounted amount rounds down in the buyer's
/// favor. RUB keeps kopeck precision.
pub fn quote(settings: &Settings, duration: PlanDuration, promo: Option<&PromoCode>) -> Quote {
    let base_stars = settings.stars_price(duration) as i64;
    let base_rub = settings.rub_price(duration);

    let (discount, bonus_days, code) = match promo {
        Some(promo) => (
            promo.discount_percent.clamp(0, 100),
            promo.bonus_days,
            Some(promo.code.clone()),
        ),
        None => (0, 0, None),
    };

    Quote {
        duration,
        days: duration.days(),
        stars: (base_stars * (100 - discount) / 100) as u32,
        rub: (base_rub * (100 - discount) as f64 / 100.0 * 100.0).round() / 100.0,
        bonus_days,
        promo_code: code,
        discount_percent: discount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn promo(discount: i64, bonus: i64) -> PromoCode {
        PromoCode {
            code: "X".to_string(),
            discount_percent: discount,
            bonus_days: bonus,
            max_uses: 10,
            current_uses: 0,
            is_active: true,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn base_prices_without_promo() {
        let settings = Settings::for_tests();
        let q = quote(&settings, PlanDuration::OneMonth, None);
        assert_eq!(q.stars, 100);
        assert_eq!(q.rub, 100.0);
        assert_eq!(q.days, 30);
        assert_eq!(q.bonus_days, 0);
    }

    #[test]
    fn stars_discount_rounds_down() {
        let settings = Settings::for_tests();
        // 250 stars at 33% off is 167.5, the buyer pays 167.
        let q = quote(&settings, PlanDuration::ThreeMonths, Some(&promo(33, 0)));
        assert_eq!(q.stars, 167);
        assert_eq!(q.rub, 167.5);
    }

    #[test]
    fn bonus_days_carried_through() {
        let settings = Settings::for_tests();
        let q = quote(&settings, PlanDuration::OneMonth, Some(&promo(0, 7)));
        assert_eq!(q.stars, 100);
        assert_eq!(q.bonus_days, 7);
        assert_eq!(q.promo_code.as_deref(), Some("X"));
    }

    #[test]
    fn discount_is_clamped() {
        let settings = Settings::for_tests();
        let q = quote(&settings, PlanDuration::OneMonth, Some(&promo(150, 0)));
        assert_eq!(q.stars, 0);
        assert_eq!(q.rub, 0.0);
    }
}

pub mod payment;
pub mod plan;
pub mod promo;
pub mod referral;
pub mod user;

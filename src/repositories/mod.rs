pub mod payment_repo;
pub mod promo_repo;
pub mod referral_repo;
pub mod user_repo;

pub use payment_repo::PaymentRepository;
pub use promo_repo::PromoRepository;
pub use referral_repo::ReferralRepository;
pub use user_repo::UserRepository;

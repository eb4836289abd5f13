pub mod access_service;
pub mod gateway;
pub mod notification_service;
pub mod pay_service;
pub mod pricing;
pub mod reconcile_service;
pub mod referral_service;
pub mod renewal_service;

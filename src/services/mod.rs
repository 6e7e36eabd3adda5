pub mod auth_service;
pub mod email_service;
pub mod referral_service;
pub mod user_service;
pub mod verification_service;

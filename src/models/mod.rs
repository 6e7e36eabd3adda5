pub mod referral;
pub mod user;

pub use referral::*;
pub use user::*;

//! 一次性验证码（登录二次验证、密码重置）

mod ledger;
mod models;

pub use ledger::OtpLedger;
pub use models::{IssuedOtp, Otp, OtpPurpose};

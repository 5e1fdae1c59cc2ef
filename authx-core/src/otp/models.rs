use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OTP 用途：决定作废与查找的范围，不同用途的码互不通用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    Login,
    PasswordReset,
}

impl OtpPurpose {
    pub const ALL: [OtpPurpose; 2] = [OtpPurpose::Login, OtpPurpose::PasswordReset];

    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "LOGIN",
            OtpPurpose::PasswordReset => "PASSWORD_RESET",
        }
    }

    /// 存储子目录名
    pub(crate) fn dir_name(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次性验证码记录
#[derive(Clone, Serialize, Deserialize)]
pub struct Otp {
    pub id: String,
    pub email: String,
    pub code: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Otp {
    /// 未使用且未过期
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// 验证码不进入日志
impl fmt::Debug for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Otp")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("purpose", &self.purpose)
            .field("expires_at", &self.expires_at)
            .field("used", &self.used)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// 签发结果：交给外部投递方发送给用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedOtp {
    pub email: String,
    pub purpose: OtpPurpose,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

//! 运行配置：数据目录、OTP 有效期、bcrypt 成本、管理员角色名

use std::env;
use std::path::PathBuf;
use tracing::warn;

/// OTP 位数（固定）
pub const OTP_LENGTH: usize = 6;
/// OTP 默认有效期：10 分钟
pub const DEFAULT_OTP_TTL_SECS: i64 = 10 * 60;
/// 环境变量允许的最长 OTP 有效期：1 天
pub const MAX_OTP_TTL_SECS: i64 = 24 * 60 * 60;
/// 特权管理员角色
pub const DEFAULT_ADMIN_ROLE: &str = "ROLE_ADMIN";
/// 持有完整权限目录的超级管理员角色
pub const SUPER_ADMIN_ROLE: &str = "ROLE_SUPER_ADMIN";

#[derive(Debug, Clone)]
pub struct AuthxConfig {
    pub data_dir: PathBuf,
    /// OTP 有效期（秒）
    pub otp_ttl_secs: i64,
    /// bcrypt cost
    pub bcrypt_cost: u32,
    /// CreateAdmin 分配的角色
    pub admin_role: String,
}

impl Default for AuthxConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            otp_ttl_secs: DEFAULT_OTP_TTL_SECS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
        }
    }
}

impl AuthxConfig {
    /// 从环境变量读取配置，缺省或非法值回退到默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = env::var("AUTHX_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let otp_ttl_secs = match env::var("AUTHX_OTP_TTL_SECS") {
            Ok(raw) => parse_otp_ttl(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "invalid AUTHX_OTP_TTL_SECS; using default");
                defaults.otp_ttl_secs
            }),
            Err(_) => defaults.otp_ttl_secs,
        };

        // bcrypt 仅接受 4..=31
        let bcrypt_cost = env::var("AUTHX_BCRYPT_COST")
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|c| (4..=31).contains(c))
            .unwrap_or(defaults.bcrypt_cost);

        let admin_role = env::var("AUTHX_ADMIN_ROLE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.admin_role);

        Self {
            data_dir,
            otp_ttl_secs,
            bcrypt_cost,
            admin_role,
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

/// 只接受 1..=MAX_OTP_TTL_SECS 秒
fn parse_otp_ttl(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| (1..=MAX_OTP_TTL_SECS).contains(secs))
}

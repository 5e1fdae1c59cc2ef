//! OTP 账本：签发、校验、过期清理
//!
//! 每个 (email, purpose) 一条谱系，存放于 `otps/<purpose>/<编码后的 email>.json`，
//! 对同一谱系的读改写由按 key 划分的锁串行化。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use super::models::{IssuedOtp, Otp, OtpPurpose};
use crate::config::{DEFAULT_OTP_TTL_SECS, OTP_LENGTH};
use crate::error::{AuthError, Result};
use crate::lock::KeyedLocks;
use crate::storage::{encode_key, read_json, write_json};

/// 生成 6 位数字码，每位独立均匀取自 0-9
fn generate_code() -> String {
    let mut rng = OsRng;
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct OtpLedger {
    dir: PathBuf,
    /// 有效期（秒），签发时换算
    ttl_secs: i64,
    locks: KeyedLocks,
}

impl OtpLedger {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            dir: data_dir.as_ref().join("otps"),
            ttl_secs: DEFAULT_OTP_TTL_SECS,
            locks: KeyedLocks::new(),
        }
    }

    /// 配置有效期（秒）
    pub fn with_ttl(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// 与其他组件共用锁表
    pub fn with_locks(mut self, locks: KeyedLocks) -> Self {
        self.locks = locks;
        self
    }

    /// 编码后超长的 email 没有谱系
    fn lineage_key(email: &str, purpose: OtpPurpose) -> Option<String> {
        encode_key(email).map(|encoded| format!("{}/{}", purpose.dir_name(), encoded))
    }

    fn lineage_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn load(&self, path: &Path) -> Result<Vec<Otp>> {
        Ok(read_json(path).await?.unwrap_or_default())
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.ttl_secs < 0 {
            return Err(AuthError::ConfigurationFault(format!(
                "otp ttl must not be negative: {}",
                self.ttl_secs
            )));
        }
        Duration::try_seconds(self.ttl_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::ConfigurationFault(format!("otp ttl out of range: {}", self.ttl_secs))
            })
    }

    /// 签发新码：先作废该谱系所有未使用的码，再写入新码，整体在谱系锁内完成
    #[instrument(skip(self))]
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> Result<IssuedOtp> {
        if email.trim().is_empty() {
            return Err(AuthError::InvalidInput("email must not be blank".into()));
        }
        let key = Self::lineage_key(email, purpose)
            .ok_or_else(|| AuthError::InvalidInput("email is too long".into()))?;
        let now = Utc::now();
        let expires_at = self.expiry_from(now)?;

        let _guard = self.locks.lock(&key).await;
        let path = self.lineage_path(&key);
        let mut lineage = self.load(&path).await?;

        let mut superseded = 0usize;
        for otp in lineage.iter_mut().filter(|otp| !otp.used) {
            otp.used = true;
            superseded += 1;
        }

        let otp = Otp {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            code: generate_code(),
            purpose,
            expires_at,
            used: false,
            created_at: now,
        };
        let issued = IssuedOtp {
            email: otp.email.clone(),
            purpose,
            code: otp.code.clone(),
            expires_at: otp.expires_at,
        };
        lineage.push(otp);
        write_json(&path, &lineage).await?;

        info!(superseded, expires_at = %issued.expires_at, "otp issued");
        Ok(issued)
    }

    /// 校验验证码。只比对该谱系中最新的一条有效码；
    /// 匹配则标记已用，不匹配时状态不变。失败原因不对外区分。
    #[instrument(skip(self, code))]
    pub async fn verify(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<bool> {
        let Some(key) = Self::lineage_key(email, purpose) else {
            warn!("otp verification failed: no active code");
            return Ok(false);
        };
        let _guard = self.locks.lock(&key).await;
        let path = self.lineage_path(&key);
        let mut lineage = self.load(&path).await?;

        let now = Utc::now();
        let latest = lineage
            .iter()
            .enumerate()
            .filter(|(_, otp)| otp.is_active(now))
            .max_by_key(|(idx, otp)| (otp.created_at, *idx))
            .map(|(idx, _)| idx);

        let Some(idx) = latest else {
            warn!("otp verification failed: no active code");
            return Ok(false);
        };

        let matches: bool = lineage[idx].code.as_bytes().ct_eq(code.as_bytes()).into();
        if !matches {
            warn!("otp verification failed: code mismatch");
            return Ok(false);
        }

        lineage[idx].used = true;
        write_json(&path, &lineage).await?;
        info!("otp verified");
        Ok(true)
    }

    /// 删除所有已过期的记录（无论是否已用），返回删除条数。幂等。
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<usize> {
        let mut removed = 0usize;
        for purpose in OtpPurpose::ALL {
            let dir = self.dir.join(purpose.dir_name());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|e| e != "json").unwrap_or(true) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let key = format!("{}/{}", purpose.dir_name(), stem);
                removed += self.sweep_lineage(&key).await?;
            }
        }
        info!(removed, "expired otps swept");
        Ok(removed)
    }

    async fn sweep_lineage(&self, key: &str) -> Result<usize> {
        let _guard = self.locks.lock(key).await;
        let path = self.lineage_path(key);
        let mut lineage = self.load(&path).await?;
        let before = lineage.len();
        let now = Utc::now();
        lineage.retain(|otp| !otp.is_expired(now));
        let removed = before - lineage.len();

        if lineage.is_empty() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else if removed > 0 {
            write_json(&path, &lineage).await?;
        }
        Ok(removed)
    }

    /// 某谱系下的全部记录（含已用），按创建顺序
    pub async fn lineage(&self, email: &str, purpose: OtpPurpose) -> Result<Vec<Otp>> {
        let Some(key) = Self::lineage_key(email, purpose) else {
            return Ok(Vec::new());
        };
        let _guard = self.locks.lock(&key).await;
        self.load(&self.lineage_path(&key)).await
    }
}

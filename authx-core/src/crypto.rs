//! 凭据哈希与校验（bcrypt，在阻塞线程中执行）

use crate::error::{AuthError, Result};
use bcrypt::{hash, verify, DEFAULT_COST};

/// 无状态的凭据校验器，仅保存 bcrypt cost
#[derive(Debug, Clone, Copy)]
pub struct CredentialVerifier {
    cost: u32,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl CredentialVerifier {
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    /// 异步哈希密码
    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || hash(&password, cost))
            .await
            .map_err(|e| AuthError::Other(format!("spawn_blocking failed: {}", e)))?
            .map_err(|e| AuthError::Other(format!("bcrypt hash failed: {}", e)))
    }

    /// 异步校验密码；哈希格式损坏视为不匹配
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        let outcome = tokio::task::spawn_blocking(move || verify(&password, &hash))
            .await
            .map_err(|e| AuthError::Other(format!("spawn_blocking failed: {}", e)))?;
        Ok(outcome.unwrap_or(false))
    }
}

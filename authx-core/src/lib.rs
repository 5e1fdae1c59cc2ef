//! Core library for identity and access: user/role/permission storage, effective authority
//! resolution, one-time passcodes, authentication workflows, and access administration.

mod admin;
mod auth;
mod config;
mod crypto;
mod error;
pub mod identity;
mod lock;
pub mod otp;
mod storage;

#[cfg(test)]
mod tests;

pub use admin::{AccessAdmin, ADMIN_CREATE, USER_PERMISSION_UPDATE, USER_ROLE_UPDATE};
pub use auth::AuthService;
pub use config::{
    AuthxConfig, DEFAULT_ADMIN_ROLE, DEFAULT_OTP_TTL_SECS, MAX_OTP_TTL_SECS, OTP_LENGTH,
    SUPER_ADMIN_ROLE,
};
pub use crypto::CredentialVerifier;
pub use error::{AuthError, Result};
pub use identity::{
    require_authority, resolve_authorities, AuthoritySet, Catalog, CreateAdminRequest,
    IdentityStore, Permission, Principal, RegisterRequest, Role, SeedReport,
    UpdateUserPermissionsRequest, UpdateUserRolesRequest, User, UserGrants, UserSummary,
};
pub use lock::KeyedLocks;
pub use otp::{IssuedOtp, Otp, OtpLedger, OtpPurpose};

/// 组装好的服务集合，各组件共享同一份存储与锁表
#[derive(Debug, Clone)]
pub struct Authx {
    pub store: IdentityStore,
    pub ledger: OtpLedger,
    pub auth: AuthService,
    pub admin: AccessAdmin,
    pub catalog: Catalog,
    pub verifier: CredentialVerifier,
}

impl Authx {
    /// 按配置打开数据目录（不存在则创建）
    pub fn open(config: &AuthxConfig) -> Result<Self> {
        let store = IdentityStore::new(&config.data_dir);
        store.ensure_dirs()?;
        let ledger = OtpLedger::new(&config.data_dir)
            .with_ttl(config.otp_ttl_secs)
            .with_locks(store.locks().clone());
        let verifier = CredentialVerifier::with_cost(config.bcrypt_cost);

        Ok(Self {
            auth: AuthService::new(store.clone(), ledger.clone(), verifier),
            admin: AccessAdmin::new(store.clone(), verifier)
                .with_admin_role(config.admin_role.clone()),
            catalog: Catalog::new(store.clone()),
            store,
            ledger,
            verifier,
        })
    }

    /// 按邮箱解析调用方的有效权限，供访问管理操作的守卫使用。不校验密码。
    pub async fn authorities_of(&self, email: &str) -> Result<AuthoritySet> {
        Ok(self.auth.principal(email).await?.authorities)
    }

    /// 校验密码后解析调用方的有效权限
    pub async fn authenticated_authorities(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthoritySet> {
        Ok(self.auth.authenticate(email, password).await?.authorities)
    }
}

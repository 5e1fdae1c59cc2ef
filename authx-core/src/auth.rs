//! 认证流程：注册、密码 + OTP 二次登录、密码重置

use tracing::{info, instrument, warn};

use crate::crypto::CredentialVerifier;
use crate::error::{AuthError, Result};
use crate::identity::{
    resolve_authorities, validate_account_input, IdentityStore, Principal, RegisterRequest, User,
};
use crate::otp::{IssuedOtp, OtpLedger, OtpPurpose};

#[derive(Debug, Clone)]
pub struct AuthService {
    store: IdentityStore,
    ledger: OtpLedger,
    verifier: CredentialVerifier,
}

impl AuthService {
    pub fn new(store: IdentityStore, ledger: OtpLedger, verifier: CredentialVerifier) -> Self {
        Self {
            store,
            ledger,
            verifier,
        }
    }

    /// 注册：新用户为启用状态，不带任何角色
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<User> {
        validate_account_input(&req.username, &req.email, &req.password)?;
        if self.store.find_user_by_email(&req.email).await?.is_some() {
            return Err(AuthError::DuplicateKey(format!("email {}", req.email)));
        }

        let password_hash = self.verifier.hash(&req.password).await?;
        let user = User::new(req.username, req.email, password_hash);
        self.store.save_user(&user).await?;

        info!(user_id = %user.id, username = %user.username, "registered user");
        Ok(user)
    }

    /// 校验邮箱与密码，返回用户。
    ///
    /// 用户不存在、已停用与密码错误返回同一个错误。
    async fn check_password(&self, email: &str, password: &str) -> Result<User> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            warn!("credentials rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !user.enabled || !self.verifier.verify(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "credentials rejected");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    /// 登录第一步：校验密码后签发 LOGIN 验证码
    #[instrument(skip(self, password))]
    pub async fn request_login_otp(&self, email: &str, password: &str) -> Result<IssuedOtp> {
        self.check_password(email, password).await?;
        self.ledger.issue(email, OtpPurpose::Login).await
    }

    /// 仅凭密码认证并返回主体视图，供可信的运维入口使用（不走 OTP）
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Principal> {
        let user = self.check_password(email, password).await?;
        self.principal_of(user).await
    }

    /// 登录第二步
    #[instrument(skip(self, code))]
    pub async fn verify_login(&self, email: &str, code: &str) -> Result<bool> {
        self.ledger.verify(email, code, OtpPurpose::Login).await
    }

    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<IssuedOtp> {
        if self.store.find_user_by_email(email).await?.is_none() {
            return Err(AuthError::UserNotFound(email.to_string()));
        }
        self.ledger.issue(email, OtpPurpose::PasswordReset).await
    }

    /// 用 PASSWORD_RESET 验证码重置密码
    #[instrument(skip(self, code, new_password))]
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<()> {
        if new_password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }
        if !self
            .ledger
            .verify(email, code, OtpPurpose::PasswordReset)
            .await?
        {
            return Err(AuthError::InvalidOrExpiredOtp);
        }

        let Some(found) = self.store.find_user_by_email(email).await? else {
            return Err(AuthError::UserNotFound(email.to_string()));
        };
        let _guard = self.store.lock_user(&found.id).await;
        // 加锁后重新读取，避免覆盖并发的角色/权限修改
        let mut user = self
            .store
            .find_user_by_id(&found.id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(email.to_string()))?;
        user.password_hash = self.verifier.hash(new_password).await?;
        user.touch();
        self.store.save_user(&user).await?;

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    /// 主体视图：用户信息与有效权限
    #[instrument(skip(self))]
    pub async fn principal(&self, email: &str) -> Result<Principal> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(email.to_string()))?;
        self.principal_of(user).await
    }

    async fn principal_of(&self, user: User) -> Result<Principal> {
        let grants = self.store.load_grants(user).await?;
        let authorities = resolve_authorities(&grants);
        let user = grants.user;
        Ok(Principal {
            user_id: user.id,
            username: user.username,
            email: user.email,
            enabled: user.enabled,
            authorities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Catalog, DEFAULT_ADMIN_PERMISSIONS};
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> AuthService {
        let store = IdentityStore::new(dir.path());
        store.ensure_dirs().unwrap();
        AuthService::new(
            store,
            OtpLedger::new(dir.path()),
            CredentialVerifier::with_cost(4),
        )
    }

    fn register_req(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_creates_enabled_user_without_roles() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        let user = auth
            .register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();
        assert!(user.enabled);
        assert!(user.roles.is_empty());
        assert!(user.permissions.is_empty());
        assert_ne!(user.password_hash, "pw1");
    }

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        auth.register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();

        let err = auth
            .register(register_req("other", "stud@x.com", "pw2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DuplicateKey");
        let err = auth
            .register(register_req("stud", "new@x.com", "pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateKey(_)));

        let err = auth
            .register(register_req("", "blank@x.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn login_otp_collapses_unknown_user_and_wrong_password() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        auth.register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();

        let unknown = auth
            .request_login_otp("nobody@x.com", "pw1")
            .await
            .unwrap_err();
        let wrong = auth
            .request_login_otp("stud@x.com", "nope")
            .await
            .unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn overlong_email_is_a_typed_failure() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        let email = format!("{}@x.com", "é".repeat(60));

        let err = auth
            .request_login_otp(&email, "pw1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = auth
            .register(register_req("wide", &email, "pw1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        assert!(!err.is_server_fault());
        assert!(!auth.verify_login(&email, "123456").await.unwrap());
        let err = auth.request_password_reset(&email).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        let user = auth
            .register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();

        let principal = auth.authenticate("stud@x.com", "pw1").await.unwrap();
        assert_eq!(principal.user_id, user.id);
        let err = auth.authenticate("stud@x.com", "pw2").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = auth.authenticate("ghost@x.com", "pw1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_otp_is_not_a_reset_code() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        auth.register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();
        let issued = auth.request_login_otp("stud@x.com", "pw1").await.unwrap();

        let err = auth
            .confirm_password_reset("stud@x.com", &issued.code, "pw2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredOtp));
        assert!(auth.verify_login("stud@x.com", &issued.code).await.unwrap());
    }

    #[tokio::test]
    async fn reset_rejects_empty_password_without_consuming_code() {
        let dir = TempDir::new().unwrap();
        let auth = service(&dir);
        auth.register(register_req("stud", "stud@x.com", "pw1"))
            .await
            .unwrap();
        let issued = auth.request_password_reset("stud@x.com").await.unwrap();

        let err = auth
            .confirm_password_reset("stud@x.com", &issued.code, "")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        auth.confirm_password_reset("stud@x.com", &issued.code, "pw2")
            .await
            .unwrap();
        auth.request_login_otp("stud@x.com", "pw2").await.unwrap();
    }

    #[tokio::test]
    async fn principal_carries_resolved_authorities() {
        let dir = TempDir::new().unwrap();
        let store = IdentityStore::new(dir.path());
        store.ensure_dirs().unwrap();
        Catalog::new(store.clone()).seed_defaults().await.unwrap();
        let auth = AuthService::new(
            store.clone(),
            OtpLedger::new(dir.path()),
            CredentialVerifier::with_cost(4),
        );

        let mut user = auth
            .register(register_req("ada", "ada@x.com", "pw1"))
            .await
            .unwrap();
        user.roles.insert("ROLE_ADMIN".into());
        user.permissions.insert("COURSE_READ".into());
        store.save_user(&user).await.unwrap();

        let principal = auth.principal("ada@x.com").await.unwrap();
        assert_eq!(principal.user_id, user.id);
        assert!(principal.authorities.permits("ROLE_ADMIN"));
        assert!(principal.authorities.permits("COURSE_READ"));
        for perm in DEFAULT_ADMIN_PERMISSIONS {
            assert!(principal.authorities.permits(perm));
        }
        assert_eq!(
            principal.authorities.len(),
            DEFAULT_ADMIN_PERMISSIONS.len() + 2
        );

        let err = auth.principal("ghost@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound(_)));
    }
}

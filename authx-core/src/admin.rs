//! 访问管理：创建管理员、替换用户角色与直接权限
//!
//! 每个操作入口先检查调用方的有效权限。

use std::collections::BTreeSet;

use tracing::{info, instrument};

use crate::config::DEFAULT_ADMIN_ROLE;
use crate::crypto::CredentialVerifier;
use crate::error::{AuthError, Result};
use crate::identity::{
    require_authority, validate_account_input, AuthoritySet, CreateAdminRequest, IdentityStore,
    UpdateUserPermissionsRequest, UpdateUserRolesRequest, User,
};

pub const ADMIN_CREATE: &str = "ADMIN_CREATE";
pub const USER_ROLE_UPDATE: &str = "USER_ROLE_UPDATE";
pub const USER_PERMISSION_UPDATE: &str = "USER_PERMISSION_UPDATE";

#[derive(Debug, Clone)]
pub struct AccessAdmin {
    store: IdentityStore,
    verifier: CredentialVerifier,
    admin_role: String,
}

impl AccessAdmin {
    pub fn new(store: IdentityStore, verifier: CredentialVerifier) -> Self {
        Self {
            store,
            verifier,
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
        }
    }

    /// 配置 CreateAdmin 分配的角色
    pub fn with_admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = role.into();
        self
    }

    /// 创建管理员：只持有管理员角色。角色缺失属于部署配置错误。
    #[instrument(skip(self, caller, req), fields(email = %req.email))]
    pub async fn create_admin(
        &self,
        caller: &AuthoritySet,
        req: CreateAdminRequest,
    ) -> Result<User> {
        require_authority(caller, ADMIN_CREATE)?;
        validate_account_input(&req.username, &req.email, &req.password)?;
        if self.store.find_user_by_email(&req.email).await?.is_some() {
            return Err(AuthError::DuplicateKey(format!("email {}", req.email)));
        }
        if self.store.find_role_by_name(&self.admin_role).await?.is_none() {
            return Err(AuthError::ConfigurationFault(format!(
                "admin role {} is not provisioned",
                self.admin_role
            )));
        }

        let password_hash = self.verifier.hash(&req.password).await?;
        let mut user = User::new(req.username, req.email, password_hash);
        user.roles = BTreeSet::from([self.admin_role.clone()]);
        self.store.save_user(&user).await?;

        info!(user_id = %user.id, role = %self.admin_role, "created admin");
        Ok(user)
    }

    /// 替换用户的角色集合（不合并）
    #[instrument(skip(self, caller, req))]
    pub async fn update_user_roles(
        &self,
        caller: &AuthoritySet,
        user_id: &str,
        req: UpdateUserRolesRequest,
    ) -> Result<User> {
        require_authority(caller, USER_ROLE_UPDATE)?;
        let _guard = self.store.lock_user(user_id).await;
        let mut user = self.get_user(user_id).await?;

        let mut roles = BTreeSet::new();
        for name in &req.roles {
            match self.store.find_role_by_name(name).await? {
                Some(role) => {
                    roles.insert(role.name);
                }
                None => return Err(AuthError::RoleNotFound(name.clone())),
            }
        }
        user.roles = roles;
        user.touch();
        self.store.save_user(&user).await?;

        info!(user_id = %user.id, roles = ?user.roles, "user roles replaced");
        Ok(user)
    }

    /// 替换用户的直接权限集合；缺省或空列表表示清空
    #[instrument(skip(self, caller, req))]
    pub async fn update_user_permissions(
        &self,
        caller: &AuthoritySet,
        user_id: &str,
        req: UpdateUserPermissionsRequest,
    ) -> Result<User> {
        require_authority(caller, USER_PERMISSION_UPDATE)?;
        let _guard = self.store.lock_user(user_id).await;
        let mut user = self.get_user(user_id).await?;

        let mut permissions = BTreeSet::new();
        for name in req.permissions.unwrap_or_default() {
            match self.store.find_permission_by_name(&name).await? {
                Some(permission) => {
                    permissions.insert(permission.name);
                }
                None => return Err(AuthError::PermissionNotFound(name)),
            }
        }
        user.permissions = permissions;
        user.touch();
        self.store.save_user(&user).await?;

        info!(
            user_id = %user.id,
            permissions = ?user.permissions,
            "user permissions replaced"
        );
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()))
    }
}

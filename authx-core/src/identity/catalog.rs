//! 权限目录：默认权限/角色播种，以及特权角色与完整目录的对账

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, instrument};

use super::models::{validate_account_input, Permission, Role, User};
use super::store::IdentityStore;
use crate::config::{DEFAULT_ADMIN_ROLE, SUPER_ADMIN_ROLE};
use crate::crypto::CredentialVerifier;
use crate::error::{AuthError, Result};

/// 默认权限目录
pub const DEFAULT_PERMISSIONS: &[(&str, &str)] = &[
    ("STUDENT_READ", "Read student information"),
    ("STUDENT_CREATE", "Create new students"),
    ("STUDENT_UPDATE", "Update student information"),
    ("STUDENT_DELETE", "Delete students"),
    ("ADMIN_CREATE", "Create new admins"),
    ("ADMIN_READ", "Read admin information"),
    ("ADMIN_UPDATE", "Update admin information"),
    ("ADMIN_DELETE", "Delete admins"),
    ("TEACHER_READ", "Read teacher information"),
    ("TEACHER_CREATE", "Create new teachers"),
    ("TEACHER_UPDATE", "Update teacher information"),
    ("TEACHER_DELETE", "Delete teachers"),
    ("COURSE_READ", "Read course information"),
    ("COURSE_CREATE", "Create new courses"),
    ("COURSE_UPDATE", "Update course information"),
    ("COURSE_DELETE", "Delete courses"),
    ("USER_ROLE_UPDATE", "Update user roles"),
    ("USER_PERMISSION_UPDATE", "Update user permissions"),
];

/// ROLE_ADMIN 默认持有的权限
pub const DEFAULT_ADMIN_PERMISSIONS: &[&str] = &[
    "STUDENT_READ",
    "STUDENT_CREATE",
    "STUDENT_UPDATE",
    "STUDENT_DELETE",
    "ADMIN_CREATE",
    "ADMIN_READ",
    "ADMIN_UPDATE",
    "ADMIN_DELETE",
];

/// 播种结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub permissions_created: Vec<String>,
    pub roles_changed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    store: IdentityStore,
}

impl Catalog {
    pub fn new(store: IdentityStore) -> Self {
        Self { store }
    }

    /// 权限不存在则创建；返回是否新建
    #[instrument(skip(self, description))]
    pub async fn ensure_permission(&self, name: &str, description: &str) -> Result<bool> {
        if self.store.find_permission_by_name(name).await?.is_some() {
            return Ok(false);
        }
        match self
            .store
            .save_permission(&Permission::new(name, description))
            .await
        {
            Ok(()) => {
                info!(permission = %name, "created permission");
                Ok(true)
            }
            // 并发创建，另一方已写入
            Err(AuthError::DuplicateKey(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 将角色的权限集合对齐为完整的当前目录。幂等，可随时调用。
    #[instrument(skip(self))]
    pub async fn reconcile_full_catalog(&self, role_name: &str) -> Result<bool> {
        let _guard = self.store.lock_role(role_name).await;
        let catalog: BTreeSet<String> = self
            .store
            .list_permissions()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        self.apply_role_permissions(role_name, catalog).await
    }

    /// 将角色的权限集合对齐为给定名单中目录里实际存在的那部分
    #[instrument(skip(self, permission_names))]
    pub async fn reconcile_role(&self, role_name: &str, permission_names: &[&str]) -> Result<bool> {
        let _guard = self.store.lock_role(role_name).await;
        let mut wanted = BTreeSet::new();
        for name in permission_names {
            if self.store.find_permission_by_name(name).await?.is_some() {
                wanted.insert(name.to_string());
            }
        }
        self.apply_role_permissions(role_name, wanted).await
    }

    /// 调用方需持有角色锁
    async fn apply_role_permissions(
        &self,
        role_name: &str,
        permissions: BTreeSet<String>,
    ) -> Result<bool> {
        let (mut role, created) = match self.store.find_role_by_name(role_name).await? {
            Some(role) => (role, false),
            None => (Role::new(role_name), true),
        };
        if !created && role.permissions == permissions {
            return Ok(false);
        }
        role.permissions = permissions;
        role.updated_at = Some(chrono::Utc::now());
        self.store.save_role(&role).await?;
        info!(
            role = %role_name,
            created,
            permissions = role.permissions.len(),
            "role permissions reconciled"
        );
        Ok(true)
    }

    /// 播种默认权限目录与内置角色，可重复执行
    #[instrument(skip(self))]
    pub async fn seed_defaults(&self) -> Result<SeedReport> {
        self.store.ensure_dirs()?;
        let mut report = SeedReport::default();
        for (name, description) in DEFAULT_PERMISSIONS {
            if self.ensure_permission(name, description).await? {
                report.permissions_created.push(name.to_string());
            }
        }
        if self.reconcile_full_catalog(SUPER_ADMIN_ROLE).await? {
            report.roles_changed.push(SUPER_ADMIN_ROLE.to_string());
        }
        if self.reconcile_role(DEFAULT_ADMIN_ROLE, DEFAULT_ADMIN_PERMISSIONS).await? {
            report.roles_changed.push(DEFAULT_ADMIN_ROLE.to_string());
        }
        Ok(report)
    }

    /// 不存在同邮箱用户时创建超级管理员；返回新建的用户
    #[instrument(skip(self, verifier, password))]
    pub async fn ensure_super_admin(
        &self,
        verifier: &CredentialVerifier,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<User>> {
        validate_account_input(username, email, password)?;
        if self.store.find_user_by_email(email).await?.is_some() {
            return Ok(None);
        }
        if self.store.find_role_by_name(SUPER_ADMIN_ROLE).await?.is_none() {
            return Err(AuthError::ConfigurationFault(format!(
                "role {} not found",
                SUPER_ADMIN_ROLE
            )));
        }
        let mut user = User::new(username, email, verifier.hash(password).await?);
        user.roles.insert(SUPER_ADMIN_ROLE.to_string());
        self.store.save_user(&user).await?;
        info!(user_id = %user.id, email = %email, "super admin created");
        Ok(Some(user))
    }
}

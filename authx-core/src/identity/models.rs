//! 身份数据模型：权限、角色、用户

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeSet;
use std::fmt;

use super::authority::AuthoritySet;
use crate::error::{AuthError, Result};
use crate::storage::encode_key;

/// 权限：创建后不可变，名称唯一（大写蛇形，如 `STUDENT_READ`）
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Permission {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            created_at: Some(Utc::now()),
        }
    }
}

/// 角色：一组权限的命名集合，按权限名引用
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            permissions: BTreeSet::new(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// 用户账户（存储模型，包含密码哈希）
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一 ID (UUID)
    pub id: String,
    /// 用户名（唯一）
    pub username: String,
    /// 邮箱（唯一，作为认证标识）
    pub email: String,
    /// bcrypt 哈希后的密码
    pub password_hash: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 角色名集合
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// 直接授予的权限名集合
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl User {
    /// 新建启用状态的用户，不带任何角色或权限
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            email: email.into(),
            password_hash,
            enabled: true,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

// 密码哈希不进入日志
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("enabled", &self.enabled)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

/// 注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// 创建管理员请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// 替换用户角色
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRolesRequest {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// 替换用户直接权限；缺省或空列表表示清空
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserPermissionsRequest {
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// 用户对外视图（不含密码哈希）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: String,
    pub enabled: bool,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            enabled: user.enabled,
            roles: user.roles,
            permissions: user.permissions,
            created_at: user.created_at,
        }
    }
}

/// 已认证主体：外部会话层据此建立登录态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub enabled: bool,
    pub authorities: AuthoritySet,
}

/// 角色/权限名校验：`[A-Z][A-Z0-9_]*`
pub fn validate_authority_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidInput(format!(
            "invalid authority name: {:?}",
            name
        )))
    }
}

/// 注册/创建管理员的基本输入校验
pub(crate) fn validate_account_input(username: &str, email: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(AuthError::InvalidInput("username must not be blank".into()));
    }
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidInput(format!("invalid email: {}", email)));
    }
    if password.is_empty() {
        return Err(AuthError::InvalidInput("password must not be empty".into()));
    }
    // 唯一键会编码进文件名
    if encode_key(email).is_none() {
        return Err(AuthError::InvalidInput("email is too long".into()));
    }
    if encode_key(username).is_none() {
        return Err(AuthError::InvalidInput("username is too long".into()));
    }
    Ok(())
}

//! 有效权限计算与授权守卫

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::models::{Role, User};
use crate::error::{AuthError, Result};

/// 主体可见的权限令牌集合（角色名 + 权限名）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthoritySet(BTreeSet<String>);

impl AuthoritySet {
    pub fn permits(&self, authority: &str) -> bool {
        self.0.contains(authority)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AuthoritySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// 已加载的用户授权图：用户及其持有的角色
#[derive(Debug, Clone)]
pub struct UserGrants {
    pub user: User,
    pub roles: Vec<Role>,
}

impl UserGrants {
    /// 只保留用户实际持有的角色
    pub fn new(user: User, roles: Vec<Role>) -> Self {
        let roles = roles
            .into_iter()
            .filter(|role| user.roles.contains(&role.name))
            .collect();
        Self { user, roles }
    }
}

/// 计算有效权限：角色名、角色下的权限名、用户直接权限名的并集。
///
/// 纯函数，不做 I/O，角色与直接权限之间没有优先级。
pub fn resolve_authorities(grants: &UserGrants) -> AuthoritySet {
    let mut authorities = BTreeSet::new();
    for role in &grants.roles {
        authorities.insert(role.name.clone());
        authorities.extend(role.permissions.iter().cloned());
    }
    authorities.extend(grants.user.permissions.iter().cloned());
    AuthoritySet(authorities)
}

/// 授权守卫：缺少所需权限时返回 Forbidden
pub fn require_authority(caller: &AuthoritySet, required: &str) -> Result<()> {
    if caller.permits(required) {
        Ok(())
    } else {
        Err(AuthError::Forbidden(required.to_string()))
    }
}

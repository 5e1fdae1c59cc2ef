//! 基于本地文件系统的身份存储：用户、角色、权限

use std::path::{Path, PathBuf};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument, warn};

use super::authority::UserGrants;
use super::models::{validate_authority_name, Permission, Role, User};
use crate::error::{AuthError, Result};
use crate::lock::KeyedLocks;
use crate::storage::{encode_key, list_json, read_json, write_json};

/// 身份存储。可克隆，克隆体共享锁。
#[derive(Debug, Clone)]
pub struct IdentityStore {
    data_dir: PathBuf,
    /// 按唯一键 / 用户 ID / 角色名串行化的修改锁
    locks: KeyedLocks,
}

// ============================================================================
// 构造与路径
// ============================================================================

impl IdentityStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            locks: KeyedLocks::new(),
        }
    }

    /// 确保存储目录存在
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.email_index_dir())?;
        std::fs::create_dir_all(self.username_index_dir())?;
        std::fs::create_dir_all(self.roles_dir())?;
        std::fs::create_dir_all(self.permissions_dir())?;
        Ok(())
    }

    fn users_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }

    fn roles_dir(&self) -> PathBuf {
        self.data_dir.join("roles")
    }

    fn permissions_dir(&self) -> PathBuf {
        self.data_dir.join("permissions")
    }

    /// 唯一键索引：users/by-email/<编码后的 email>.json -> 用户 ID
    fn email_index_dir(&self) -> PathBuf {
        self.users_dir().join("by-email")
    }

    fn username_index_dir(&self) -> PathBuf {
        self.users_dir().join("by-username")
    }

    /// 编码后超过文件名长度上限的键没有对应文件
    fn email_key_path(&self, email: &str) -> Option<PathBuf> {
        encode_key(email).map(|key| self.email_index_dir().join(format!("{}.json", key)))
    }

    fn username_key_path(&self, username: &str) -> Option<PathBuf> {
        encode_key(username).map(|key| self.username_index_dir().join(format!("{}.json", key)))
    }

    pub(crate) fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    fn user_path(&self, id: &str) -> PathBuf {
        self.users_dir().join(format!("{}.json", id))
    }

    fn role_path(&self, name: &str) -> PathBuf {
        self.roles_dir().join(format!("{}.json", name))
    }

    fn permission_path(&self, name: &str) -> PathBuf {
        self.permissions_dir().join(format!("{}.json", name))
    }

    /// 串行化同一用户的读改写
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(&format!("user:{}", user_id)).await
    }

    /// 串行化同一角色的读改写
    pub async fn lock_role(&self, name: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(&format!("role:{}", name)).await
    }
}

/// 用户 ID 只允许字母数字与 `-`，避免路径穿越
fn is_valid_user_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

// ============================================================================
// 用户
// ============================================================================

impl IdentityStore {
    #[instrument(skip(self))]
    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        if !is_valid_user_id(id) {
            return Ok(None);
        }
        read_json(&self.user_path(id)).await
    }

    #[instrument(skip(self))]
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(key_path) = self.email_key_path(email) else {
            return Ok(None);
        };
        match read_json::<String>(&key_path).await? {
            Some(id) => Ok(self
                .find_user_by_id(&id)
                .await?
                .filter(|user| user.email == email)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let Some(key_path) = self.username_key_path(username) else {
            return Ok(None);
        };
        match read_json::<String>(&key_path).await? {
            Some(id) => Ok(self
                .find_user_by_id(&id)
                .await?
                .filter(|user| user.username == username)),
            None => Ok(None),
        }
    }

    /// 列出所有用户
    pub async fn list_users(&self) -> Result<Vec<User>> {
        list_json(&self.users_dir()).await
    }

    /// 保存用户（新建或覆盖）。
    ///
    /// email / username 已被其他用户占用时返回 `DuplicateKey`，不会覆盖他人记录。
    /// 只锁定本用户的两个唯一键，不同身份之间互不阻塞。
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn save_user(&self, user: &User) -> Result<()> {
        if !is_valid_user_id(&user.id) {
            return Err(AuthError::InvalidInput(format!("invalid user id: {}", user.id)));
        }
        // 固定加锁顺序：先 email 后 username
        let _email_guard = self.locks.lock(&format!("email:{}", user.email)).await;
        let _username_guard = self.locks.lock(&format!("username:{}", user.username)).await;

        if let Some(existing) = self.find_user_by_id(&user.id).await? {
            if existing.email != user.email || existing.username != user.username {
                return Err(AuthError::InvalidInput(
                    "email and username cannot be changed".into(),
                ));
            }
        }
        let email_key = self
            .email_key_path(&user.email)
            .ok_or_else(|| AuthError::InvalidInput("email is too long".into()))?;
        let username_key = self
            .username_key_path(&user.username)
            .ok_or_else(|| AuthError::InvalidInput("username is too long".into()))?;
        let claim_email = self
            .check_owner(&email_key, &user.id, || format!("email {}", user.email))
            .await?;
        let claim_username = self
            .check_owner(&username_key, &user.id, || format!("username {}", user.username))
            .await?;

        // 先占用唯一键，再写用户记录；任一步失败都撤销本次新占用的键
        let mut claimed: Vec<&Path> = Vec::new();
        if claim_email {
            claimed.push(&email_key);
        }
        if claim_username {
            claimed.push(&username_key);
        }
        if let Err(e) = self.write_user_with_keys(user, &claimed).await {
            for path in claimed {
                if let Err(rollback) = tokio::fs::remove_file(path).await {
                    if rollback.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %rollback, "failed to release unique key");
                    }
                }
            }
            return Err(e);
        }
        debug!("user persisted");
        Ok(())
    }

    async fn write_user_with_keys(&self, user: &User, key_paths: &[&Path]) -> Result<()> {
        for path in key_paths {
            write_json(path, &user.id).await?;
        }
        write_json(&self.user_path(&user.id), user).await
    }

    /// 检查唯一键归属：返回是否需要新写入键文件。
    ///
    /// 指向不存在用户的键文件视为残留，可以被重新占用。
    async fn check_owner(
        &self,
        key_path: &Path,
        user_id: &str,
        describe: impl FnOnce() -> String,
    ) -> Result<bool> {
        match read_json::<String>(key_path).await? {
            Some(owner) if owner == user_id => Ok(false),
            Some(owner) => {
                if self.find_user_by_id(&owner).await?.is_some() {
                    Err(AuthError::DuplicateKey(describe()))
                } else {
                    warn!(owner = %owner, "reclaiming unique key left by a missing user");
                    Ok(true)
                }
            }
            None => Ok(true),
        }
    }

    /// 加载用户持有的角色，构成授权图
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn load_grants(&self, user: User) -> Result<UserGrants> {
        let mut roles = Vec::with_capacity(user.roles.len());
        for name in &user.roles {
            match self.find_role_by_name(name).await? {
                Some(role) => roles.push(role),
                None => warn!(role = %name, "user references missing role"),
            }
        }
        Ok(UserGrants::new(user, roles))
    }
}

// ============================================================================
// 角色与权限
// ============================================================================

impl IdentityStore {
    #[instrument(skip(self))]
    pub async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        if validate_authority_name(name).is_err() {
            return Ok(None);
        }
        read_json(&self.role_path(name)).await
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        list_json(&self.roles_dir()).await
    }

    /// 保存角色；同名但 ID 不同的角色已存在时返回 `DuplicateKey`
    #[instrument(skip(self, role), fields(role = %role.name))]
    pub async fn save_role(&self, role: &Role) -> Result<()> {
        validate_authority_name(&role.name)?;
        let _guard = self.locks.lock(&format!("role-file:{}", role.name)).await;
        if let Some(existing) = self.find_role_by_name(&role.name).await? {
            if existing.id != role.id {
                return Err(AuthError::DuplicateKey(format!("role {}", role.name)));
            }
        }
        write_json(&self.role_path(&role.name), role).await
    }

    #[instrument(skip(self))]
    pub async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>> {
        if validate_authority_name(name).is_err() {
            return Ok(None);
        }
        read_json(&self.permission_path(name)).await
    }

    /// 完整权限目录
    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        list_json(&self.permissions_dir()).await
    }

    /// 保存权限；同名但 ID 不同的权限已存在时返回 `DuplicateKey`
    #[instrument(skip(self, permission), fields(permission = %permission.name))]
    pub async fn save_permission(&self, permission: &Permission) -> Result<()> {
        validate_authority_name(&permission.name)?;
        let _guard = self
            .locks
            .lock(&format!("permission-file:{}", permission.name))
            .await;
        if let Some(existing) = self.find_permission_by_name(&permission.name).await? {
            if existing.id != permission.id {
                return Err(AuthError::DuplicateKey(format!(
                    "permission {}",
                    permission.name
                )));
            }
        }
        write_json(&self.permission_path(&permission.name), permission).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> IdentityStore {
        let store = IdentityStore::new(dir.path());
        store.ensure_dirs().unwrap();
        store
    }

    #[tokio::test]
    async fn lookups_return_none_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.find_user_by_email("a@x.com").await.unwrap().is_none());
        assert!(store.find_user_by_username("a").await.unwrap().is_none());
        assert!(store.find_user_by_id("missing").await.unwrap().is_none());
        assert!(store.find_user_by_id("../etc/passwd").await.unwrap().is_none());
        assert!(store.find_role_by_name("ROLE_ADMIN").await.unwrap().is_none());
        assert!(store.find_permission_by_name("X_READ").await.unwrap().is_none());
        assert!(store.list_permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_find_user_by_each_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let user = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&user).await.unwrap();

        let by_email = store.find_user_by_email("stud@x.com").await.unwrap().unwrap();
        let by_name = store.find_user_by_username("stud").await.unwrap().unwrap();
        let by_id = store.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_id.email, "stud@x.com");
        assert!(store.find_user_by_email("STUD@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unique_key_collision_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let first = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&first).await.unwrap();

        let same_email = User::new("other", "stud@x.com", "hash".into());
        let err = store.save_user(&same_email).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateKey(_)));

        let same_name = User::new("stud", "other@x.com", "hash".into());
        let err = store.save_user(&same_name).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateKey(_)));

        let kept = store.find_user_by_email("stud@x.com").await.unwrap().unwrap();
        assert_eq!(kept.id, first.id);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resaving_same_user_updates_in_place() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut user = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&user).await.unwrap();
        user.password_hash = "hash2".into();
        store.save_user(&user).await.unwrap();

        let loaded = store.find_user_by_email("stud@x.com").await.unwrap().unwrap();
        assert_eq!(loaded.password_hash, "hash2");
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unique_keys_are_immutable() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut user = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&user).await.unwrap();
        user.email = "new@x.com".into();
        let err = store.save_user(&user).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        assert!(store.find_user_by_email("new@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn role_and_permission_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .save_permission(&Permission::new("STUDENT_READ", "Read students"))
            .await
            .unwrap();
        let err = store
            .save_permission(&Permission::new("STUDENT_READ", "dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateKey(_)));

        let mut role = Role::new("ROLE_ADMIN");
        store.save_role(&role).await.unwrap();
        role.permissions.insert("STUDENT_READ".into());
        store.save_role(&role).await.unwrap();
        let err = store.save_role(&Role::new("ROLE_ADMIN")).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateKey(_)));

        let loaded = store.find_role_by_name("ROLE_ADMIN").await.unwrap().unwrap();
        assert!(loaded.permissions.contains("STUDENT_READ"));
        assert!(store.save_role(&Role::new("bad name")).await.is_err());
    }

    #[tokio::test]
    async fn grants_skip_roles_that_do_not_exist() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut role = Role::new("ROLE_TEACHER");
        role.permissions.insert("COURSE_READ".into());
        store.save_role(&role).await.unwrap();

        let mut user = User::new("t", "t@x.com", "hash".into());
        user.roles.insert("ROLE_TEACHER".into());
        user.roles.insert("ROLE_GHOST".into());
        let grants = store.load_grants(user).await.unwrap();
        assert_eq!(grants.roles.len(), 1);
        assert_eq!(grants.roles[0].name, "ROLE_TEACHER");
    }

    #[tokio::test]
    async fn overlong_keys_are_absent_or_invalid() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let email = format!("{}@x.com", "é".repeat(60));

        assert!(store.find_user_by_email(&email).await.unwrap().is_none());
        assert!(store
            .find_user_by_username(&"é".repeat(60))
            .await
            .unwrap()
            .is_none());
        let err = store
            .save_user(&User::new("wide", email, "hash".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_user_write_releases_claimed_keys() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let blocked = User::new("stud", "stud@x.com", "hash".into());
        // 用户记录路径被目录占据，rename 失败
        std::fs::create_dir_all(store.user_path(&blocked.id)).unwrap();

        assert!(store.save_user(&blocked).await.is_err());
        assert!(!store.email_key_path("stud@x.com").unwrap().exists());
        assert!(!store.username_key_path("stud").unwrap().exists());

        let retry = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&retry).await.unwrap();
        let found = store.find_user_by_email("stud@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, retry.id);
    }

    #[tokio::test]
    async fn key_left_by_missing_user_can_be_reclaimed() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let ghost = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&ghost).await.unwrap();
        std::fs::remove_file(store.user_path(&ghost.id)).unwrap();
        assert!(store.find_user_by_email("stud@x.com").await.unwrap().is_none());

        let user = User::new("stud", "stud@x.com", "hash".into());
        store.save_user(&user).await.unwrap();
        let found = store.find_user_by_username("stud").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_saves_with_same_email_admit_one() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let user = User::new(format!("u{}", i), "race@x.com", "hash".into());
                    store.save_user(&user).await
                })
            })
            .collect();
        let results = futures::future::join_all(tasks).await;
        let ok = results.into_iter().filter(|r| matches!(r, Ok(Ok(())))).count();
        assert_eq!(ok, 1);
    }
}

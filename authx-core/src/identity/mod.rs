//! 身份与权限：数据模型、文件存储、有效权限计算、权限目录

mod authority;
mod catalog;
mod models;
mod store;

pub use authority::{require_authority, resolve_authorities, AuthoritySet, UserGrants};
pub use catalog::{Catalog, SeedReport, DEFAULT_ADMIN_PERMISSIONS, DEFAULT_PERMISSIONS};
pub use models::{
    validate_authority_name, CreateAdminRequest, Permission, Principal, RegisterRequest, Role,
    UpdateUserPermissionsRequest, UpdateUserRolesRequest, User, UserSummary,
};
pub(crate) use models::validate_account_input;
pub use store::IdentityStore;

mod admin;
mod auth;
mod maintenance;
mod output;
pub mod ui;

pub use admin::{
    create_admin, get_user, list_permissions, list_roles, list_users, set_permissions, set_roles,
    Caller,
};
pub use auth::{login_request, login_verify, register, reset_confirm, reset_request, whoami};
pub use maintenance::{reconcile, seed, sweep_otps, SuperAdmin};
pub use output::OutputFormat;

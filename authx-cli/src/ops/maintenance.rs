//! 播种与清理

use authx_core::{Authx, UserSummary, SUPER_ADMIN_ROLE};
use serde::Serialize;

use super::output::{print_json, OutputFormat};
use super::ui::{format_list, print_kv, print_success};

/// 超级管理员账号参数
pub struct SuperAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct SeedOutput {
    permissions_created: Vec<String>,
    roles_changed: Vec<String>,
    super_admin: Option<UserSummary>,
}

pub async fn seed(
    authx: &Authx,
    super_admin: Option<SuperAdmin>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let report = authx.catalog.seed_defaults().await?;
    let created = match super_admin {
        Some(sa) => authx
            .catalog
            .ensure_super_admin(&authx.verifier, &sa.username, &sa.email, &sa.password)
            .await?
            .map(UserSummary::from),
        None => None,
    };

    let out = SeedOutput {
        permissions_created: report.permissions_created,
        roles_changed: report.roles_changed,
        super_admin: created,
    };
    if output.is_json() {
        return print_json(&out);
    }
    print_success("权限目录已对齐");
    print_kv(
        "Created",
        &format_list(out.permissions_created.iter().map(String::as_str)),
    );
    print_kv(
        "Roles",
        &format_list(out.roles_changed.iter().map(String::as_str)),
    );
    if let Some(user) = &out.super_admin {
        print_success(&format!("{} {} 已创建", SUPER_ADMIN_ROLE, user.email));
        print_kv("ID", &user.id);
    }
    Ok(())
}

/// 将角色权限对齐为完整目录
pub async fn reconcile(authx: &Authx, role: &str, output: OutputFormat) -> anyhow::Result<()> {
    let changed = authx.catalog.reconcile_full_catalog(role).await?;
    if output.is_json() {
        return print_json(&serde_json::json!({ "role": role, "changed": changed }));
    }
    if changed {
        print_success(&format!("{} 已对齐完整权限目录", role));
    } else {
        print_success(&format!("{} 无需变更", role));
    }
    Ok(())
}

pub async fn sweep_otps(authx: &Authx, output: OutputFormat) -> anyhow::Result<()> {
    let removed = authx.ledger.sweep().await?;
    if output.is_json() {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    print_success(&format!("已清理 {} 条过期验证码", removed));
    Ok(())
}

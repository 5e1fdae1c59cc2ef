//! 访问管理与查询

use authx_core::{
    AuthoritySet, Authx, CreateAdminRequest, UpdateUserPermissionsRequest,
    UpdateUserRolesRequest, UserSummary,
};

use super::output::{print_json, OutputFormat};
use super::ui::{
    format_list, print_empty, print_header, print_kv, print_section, print_success,
    print_table_header, print_table_row,
};

/// 调用者凭据
pub struct Caller {
    pub email: String,
    pub password: String,
}

/// 校验调用者密码后解析其有效权限
async fn authorize(authx: &Authx, caller: &Caller) -> anyhow::Result<AuthoritySet> {
    Ok(authx
        .authenticated_authorities(&caller.email, &caller.password)
        .await?)
}

fn show_user(summary: &UserSummary, output: OutputFormat) -> anyhow::Result<()> {
    if output.is_json() {
        return print_json(summary);
    }
    print_header(&format!("👤 用户: {}", summary.username));
    print_kv("ID", &summary.id);
    print_kv("Email", &summary.email);
    print_kv("Enabled", &summary.enabled.to_string());
    print_kv(
        "Created At",
        &summary
            .created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "未知".into()),
    );
    print_section("角色");
    println!("  {}", format_list(summary.roles.iter().map(String::as_str)));
    print_section("直接权限");
    println!(
        "  {}",
        format_list(summary.permissions.iter().map(String::as_str))
    );
    println!();
    Ok(())
}

pub async fn create_admin(
    authx: &Authx,
    caller: &Caller,
    req: CreateAdminRequest,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let caller = authorize(authx, caller).await?;
    let user = authx.admin.create_admin(&caller, req).await?;
    let summary = UserSummary::from(user);
    if output.is_json() {
        return print_json(&summary);
    }
    print_success(&format!("管理员 {} 创建成功", summary.username));
    print_kv("ID", &summary.id);
    Ok(())
}

pub async fn set_roles(
    authx: &Authx,
    caller: &Caller,
    user_id: &str,
    roles: Vec<String>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let caller = authorize(authx, caller).await?;
    let user = authx
        .admin
        .update_user_roles(&caller, user_id, UpdateUserRolesRequest { roles })
        .await?;
    show_user(&UserSummary::from(user), output)
}

pub async fn set_permissions(
    authx: &Authx,
    caller: &Caller,
    user_id: &str,
    permissions: Vec<String>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let caller = authorize(authx, caller).await?;
    let user = authx
        .admin
        .update_user_permissions(
            &caller,
            user_id,
            UpdateUserPermissionsRequest {
                permissions: Some(permissions),
            },
        )
        .await?;
    show_user(&UserSummary::from(user), output)
}

pub async fn get_user(authx: &Authx, user_id: &str, output: OutputFormat) -> anyhow::Result<()> {
    let user = authx.admin.get_user(user_id).await?;
    show_user(&UserSummary::from(user), output)
}

pub async fn list_users(authx: &Authx, output: OutputFormat) -> anyhow::Result<()> {
    let mut users: Vec<UserSummary> = authx
        .store
        .list_users()
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect();
    users.sort_by(|a, b| a.email.cmp(&b.email));

    if output.is_json() {
        return print_json(&users);
    }
    print_header("👥 用户列表");
    if users.is_empty() {
        print_empty("暂无用户");
        return Ok(());
    }
    print_table_header(&[("ID", 36), ("USERNAME", 16), ("EMAIL", 24), ("ROLES", 30)]);
    for user in &users {
        let roles = user.roles.iter().cloned().collect::<Vec<_>>().join(",");
        print_table_row(&[
            (user.id.as_str(), 36),
            (user.username.as_str(), 16),
            (user.email.as_str(), 24),
            (roles.as_str(), 30),
        ]);
    }
    println!();
    Ok(())
}

pub async fn list_roles(authx: &Authx, output: OutputFormat) -> anyhow::Result<()> {
    let mut roles = authx.store.list_roles().await?;
    roles.sort_by(|a, b| a.name.cmp(&b.name));

    if output.is_json() {
        return print_json(&roles);
    }
    print_header("🛡 角色列表");
    if roles.is_empty() {
        print_empty("暂无角色，先执行 `authx seed`");
        return Ok(());
    }
    for role in &roles {
        print_section(&role.name);
        println!(
            "  {}",
            format_list(role.permissions.iter().map(String::as_str))
        );
    }
    println!();
    Ok(())
}

pub async fn list_permissions(authx: &Authx, output: OutputFormat) -> anyhow::Result<()> {
    let mut permissions = authx.store.list_permissions().await?;
    permissions.sort_by(|a, b| a.name.cmp(&b.name));

    if output.is_json() {
        return print_json(&permissions);
    }
    print_header("🔑 权限目录");
    if permissions.is_empty() {
        print_empty("暂无权限，先执行 `authx seed`");
        return Ok(());
    }
    print_table_header(&[("NAME", 26), ("DESCRIPTION", 40)]);
    for permission in &permissions {
        print_table_row(&[
            (permission.name.as_str(), 26),
            (permission.description.as_str(), 40),
        ]);
    }
    println!();
    Ok(())
}

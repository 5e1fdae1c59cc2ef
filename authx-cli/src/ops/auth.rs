//! 注册、登录、密码重置

use authx_core::{Authx, IssuedOtp, RegisterRequest, UserSummary};

use super::output::{print_json, OutputFormat};
use super::ui::{
    format_list, print_error, print_header, print_hint, print_kv, print_kv_highlight,
    print_success,
};

/// 无投递通道，直接展示签发的验证码
fn show_issued(issued: &IssuedOtp, output: OutputFormat) -> anyhow::Result<()> {
    if output.is_json() {
        return print_json(issued);
    }
    print_success(&format!("{} 验证码已签发", issued.purpose));
    print_kv("Email", &issued.email);
    print_kv_highlight("Code", &issued.code);
    print_kv("Expires At", &issued.expires_at.to_rfc3339());
    Ok(())
}

pub async fn register(
    authx: &Authx,
    username: String,
    email: String,
    password: String,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let user = authx
        .auth
        .register(RegisterRequest {
            username,
            email,
            password,
        })
        .await?;
    let summary = UserSummary::from(user);

    if output.is_json() {
        return print_json(&summary);
    }
    print_success(&format!("用户 {} 注册成功", summary.username));
    print_kv("ID", &summary.id);
    print_kv("Email", &summary.email);
    Ok(())
}

pub async fn login_request(
    authx: &Authx,
    email: &str,
    password: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let issued = authx.auth.request_login_otp(email, password).await?;
    show_issued(&issued, output)?;
    if !output.is_json() {
        print_hint("使用 `authx login verify --email <email> --code <code>` 完成登录");
    }
    Ok(())
}

/// 校验失败时返回错误，使进程以非零码退出
pub async fn login_verify(
    authx: &Authx,
    email: &str,
    code: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    if !authx.auth.verify_login(email, code).await? {
        if !output.is_json() {
            print_error("验证码无效或已过期");
        }
        anyhow::bail!("invalid or expired otp");
    }
    let principal = authx.auth.principal(email).await?;

    if output.is_json() {
        return print_json(&principal);
    }
    print_header(&format!("🔐 登录成功: {}", principal.username));
    print_kv("User ID", &principal.user_id);
    print_kv("Email", &principal.email);
    print_kv("Authorities", &format_list(principal.authorities.iter()));
    Ok(())
}

pub async fn reset_request(authx: &Authx, email: &str, output: OutputFormat) -> anyhow::Result<()> {
    let issued = authx.auth.request_password_reset(email).await?;
    show_issued(&issued, output)
}

pub async fn reset_confirm(
    authx: &Authx,
    email: &str,
    code: &str,
    new_password: &str,
    output: OutputFormat,
) -> anyhow::Result<()> {
    authx
        .auth
        .confirm_password_reset(email, code, new_password)
        .await?;
    if output.is_json() {
        return print_json(&serde_json::json!({ "email": email, "reset": true }));
    }
    print_success("密码已重置");
    Ok(())
}

/// 查看主体的有效权限
pub async fn whoami(authx: &Authx, email: &str, output: OutputFormat) -> anyhow::Result<()> {
    let principal = authx.auth.principal(email).await?;
    if output.is_json() {
        return print_json(&principal);
    }
    print_header(&format!("👤 {}", principal.username));
    print_kv("User ID", &principal.user_id);
    print_kv("Email", &principal.email);
    print_kv("Enabled", &principal.enabled.to_string());
    print_kv("Authorities", &format_list(principal.authorities.iter()));
    Ok(())
}

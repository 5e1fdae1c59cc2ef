mod ops;

use authx_core::{Authx, AuthxConfig, CreateAdminRequest};
use clap::{Parser, Subcommand};
use ops::{Caller, OutputFormat, SuperAdmin};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI driving the authx core directly against a data directory.
#[derive(Parser)]
#[command(
    name = "authx",
    author,
    version,
    about = "Identity, OTP login and access administration"
)]
struct Cli {
    /// 数据目录
    #[arg(long, env = "AUTHX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 播种默认权限目录与内置角色（可重复执行）
    Seed {
        /// 同时创建超级管理员（需同时提供 email 与 password）
        #[arg(long, requires_all = ["super_email", "super_password"])]
        super_username: Option<String>,
        #[arg(long)]
        super_email: Option<String>,
        #[arg(long, env = "AUTHX_SUPER_PASSWORD")]
        super_password: Option<String>,
    },
    /// 将角色对齐为完整权限目录
    Reconcile {
        #[arg(default_value = authx_core::SUPER_ADMIN_ROLE)]
        role: String,
    },
    /// 注册新用户
    Register {
        #[arg(long, short)]
        username: String,
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        password: String,
    },
    /// 密码 + OTP 登录
    #[command(subcommand)]
    Login(LoginCommands),
    /// 密码重置
    #[command(subcommand)]
    Reset(ResetCommands),
    /// 查看用户的有效权限
    Whoami {
        #[arg(long, short)]
        email: String,
    },
    /// 访问管理（以 --as 指定的用户身份执行，需提供该用户的密码）
    Admin {
        /// 调用者邮箱
        #[arg(long = "as", env = "AUTHX_AS")]
        as_email: String,
        /// 调用者密码
        #[arg(long = "as-password", env = "AUTHX_AS_PASSWORD")]
        as_password: String,
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// 查询
    #[command(subcommand)]
    User(UserCommands),
    /// 验证码维护
    #[command(subcommand)]
    Otp(OtpCommands),
}

#[derive(Subcommand)]
enum LoginCommands {
    /// 校验密码并签发登录验证码
    Request {
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        password: String,
    },
    /// 提交登录验证码
    Verify {
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        code: String,
    },
}

#[derive(Subcommand)]
enum ResetCommands {
    /// 签发重置验证码
    Request {
        #[arg(long, short)]
        email: String,
    },
    /// 使用验证码设置新密码
    Confirm {
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        code: String,
        #[arg(long, short)]
        password: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// 创建管理员
    Create {
        #[arg(long, short)]
        username: String,
        #[arg(long, short)]
        email: String,
        #[arg(long, short)]
        password: String,
    },
    /// 替换用户角色
    Roles {
        user_id: String,
        #[arg(long, short, value_delimiter = ',')]
        roles: Vec<String>,
    },
    /// 替换用户直接权限（不传则清空）
    Permissions {
        user_id: String,
        #[arg(long, short, value_delimiter = ',')]
        permissions: Vec<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// 列出所有用户
    List,
    /// 获取用户详情
    Get { id: String },
    /// 列出角色
    Roles,
    /// 列出权限目录
    Permissions,
}

#[derive(Subcommand)]
enum OtpCommands {
    /// 删除所有过期验证码
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载 .env 文件（如果存在），忽略错误
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let mut config = AuthxConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    let authx = Authx::open(&config)?;
    let output = cli.output;

    match cli.command {
        Commands::Seed {
            super_username,
            super_email,
            super_password,
        } => {
            let super_admin = match (super_username, super_email, super_password) {
                (Some(username), Some(email), Some(password)) => Some(SuperAdmin {
                    username,
                    email,
                    password,
                }),
                _ => None,
            };
            ops::seed(&authx, super_admin, output).await?
        }
        Commands::Reconcile { role } => ops::reconcile(&authx, &role, output).await?,
        Commands::Register {
            username,
            email,
            password,
        } => ops::register(&authx, username, email, password, output).await?,
        Commands::Login(cmd) => match cmd {
            LoginCommands::Request { email, password } => {
                ops::login_request(&authx, &email, &password, output).await?
            }
            LoginCommands::Verify { email, code } => {
                ops::login_verify(&authx, &email, &code, output).await?
            }
        },
        Commands::Reset(cmd) => match cmd {
            ResetCommands::Request { email } => ops::reset_request(&authx, &email, output).await?,
            ResetCommands::Confirm {
                email,
                code,
                password,
            } => ops::reset_confirm(&authx, &email, &code, &password, output).await?,
        },
        Commands::Whoami { email } => ops::whoami(&authx, &email, output).await?,
        Commands::Admin {
            as_email,
            as_password,
            command,
        } => {
            let caller = Caller {
                email: as_email,
                password: as_password,
            };
            match command {
                AdminCommands::Create {
                    username,
                    email,
                    password,
                } => {
                    let req = CreateAdminRequest {
                        username,
                        email,
                        password,
                    };
                    ops::create_admin(&authx, &caller, req, output).await?
                }
                AdminCommands::Roles { user_id, roles } => {
                    ops::set_roles(&authx, &caller, &user_id, roles, output).await?
                }
                AdminCommands::Permissions {
                    user_id,
                    permissions,
                } => ops::set_permissions(&authx, &caller, &user_id, permissions, output).await?,
            }
        }
        Commands::User(cmd) => match cmd {
            UserCommands::List => ops::list_users(&authx, output).await?,
            UserCommands::Get { id } => ops::get_user(&authx, &id, output).await?,
            UserCommands::Roles => ops::list_roles(&authx, output).await?,
            UserCommands::Permissions => ops::list_permissions(&authx, output).await?,
        },
        Commands::Otp(OtpCommands::Sweep) => ops::sweep_otps(&authx, output).await?,
    }

    Ok(())
}

fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

use thiserror::Error;

/// Common result type for core operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} already exists")]
    DuplicateKey(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("permission not found: {0}")]
    PermissionNotFound(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired otp")]
    InvalidOrExpiredOtp,
    #[error("forbidden: missing authority '{0}'")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration fault: {0}")]
    ConfigurationFault(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("other error: {0}")]
    Other(String),
}

impl AuthError {
    /// 稳定的错误码，供外层（HTTP 等）映射状态码使用
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::DuplicateKey(_) => "DuplicateKey",
            AuthError::UserNotFound(_) => "UserNotFound",
            AuthError::RoleNotFound(_) => "RoleNotFound",
            AuthError::PermissionNotFound(_) => "PermissionNotFound",
            AuthError::InvalidCredentials => "InvalidCredentials",
            AuthError::InvalidOrExpiredOtp => "InvalidOrExpiredOtp",
            AuthError::Forbidden(_) => "Forbidden",
            AuthError::InvalidInput(_) => "InvalidInput",
            AuthError::ConfigurationFault(_) => "ConfigurationFault",
            AuthError::Io(_) => "IoError",
            AuthError::Serde(_) => "SerdeError",
            AuthError::Other(_) => "Error",
        }
    }

    /// 是否属于服务端故障（部署配置错误或存储异常），其余均为调用方可恢复的校验失败
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            AuthError::ConfigurationFault(_)
                | AuthError::Io(_)
                | AuthError::Serde(_)
                | AuthError::Other(_)
        )
    }
}

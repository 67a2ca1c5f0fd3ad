use thiserror::Error;

/// 客户端统一错误类型。
/// 变体只携带格式化后的上下文字符串，便于在队列事件中克隆传递。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriveError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("session expired; please sign in again")]
    SessionExpired,

    #[error("{0}")]
    Validation(String),

    #[error("server returned HTTP {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DriveError {
    /// 用户主动取消不算失败，调用方据此区分 cancelled 与 error。
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DriveError::Cancelled)
    }

    /// 会话已失效，界面必须回到登录页。
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, DriveError::SessionExpired)
    }
}

pub type DriveResult<T> = std::result::Result<T, DriveError>;

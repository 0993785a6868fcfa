use thiserror::Error;

use crate::entities::TicketStatus;

#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("非法的状态转换: {from} -> {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },
    #[error("工单不存在: id={id}")]
    TicketNotFound { id: String },
    #[error("技师不可用: {0}")]
    TechnicianUnavailable(String),
    #[error("坐标无效: {0}")]
    InvalidCoordinates(String),
    #[error("定位时间戳超出允许偏差: {0}")]
    StaleOrFuture(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn invalid_transition(from: TicketStatus, to: TicketStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
    pub fn ticket_not_found<S: ToString>(id: S) -> Self {
        Self::TicketNotFound { id: id.to_string() }
    }
    pub fn technician_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::TechnicianUnavailable(msg.into())
    }
    pub fn invalid_coordinates<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCoordinates(msg.into())
    }
    pub fn stale_or_future<S: Into<String>>(msg: S) -> Self {
        Self::StaleOrFuture(msg.into())
    }
    pub fn store_error<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 调用方可以安全重试的错误（幂等前置条件在每次尝试时重新检查）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::StoreUnavailable(_) | DispatchError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

//! 存储调用超时保护
//!
//! 超时返回类型化的 Timeout 错误且不产生部分变更，
//! 调用方据此决定退避重试策略。

use std::future::Future;
use std::time::Duration;

use dispatch_domain::{DispatchError, DispatchResult};

pub async fn with_timeout<T, F>(
    duration: Duration,
    operation: &str,
    fut: F,
) -> DispatchResult<T>
where
    F: Future<Output = DispatchResult<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(format!(
            "{operation} 超过 {}ms 未完成",
            duration.as_millis()
        ))),
    }
}

// seismic_notify/src/error.rs

//! 通知客户端的错误类型。
//!
//! 连接层面的失败 (连接失败、超时、断开) 都由连接监管器吸收并转化为状态迁移，
//! 不会出现在这里；只有调用方的使用错误会同步返回给调用方。

use thiserror::Error;

/// 订阅者回调可以返回的任意错误。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 通知客户端对调用方暴露的错误。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 当前没有打开的连接，发送未被执行，也不会被重试。
    #[error("未连接到通知服务")]
    NotConnected,

    /// 频道名不合法 (目前只要求非空)。
    #[error("无效的频道名: '{0}'")]
    InvalidChannel(String),

    /// 客户端已经关闭 (`shutdown()` 之后)。
    #[error("通知客户端已关闭")]
    Closed,

    /// 当前线程不在 Tokio 运行时中，无法启动连接监管任务。
    #[error("必须在 Tokio 运行时内创建通知客户端")]
    NoRuntime,

    /// 配置不合法。
    #[error("配置错误: {0}")]
    Config(String),
}

/// 单个订阅者回调失败。被隔离记录，不影响其他订阅者，也不影响连接。
#[derive(Error, Debug)]
pub enum CallbackError {
    /// 回调返回了错误。
    #[error("订阅者回调返回错误: {0}")]
    Failed(#[source] BoxError),

    /// 回调发生了 panic。
    #[error("订阅者回调发生 panic: {0}")]
    Panicked(String),
}

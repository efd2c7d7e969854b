// notify_transport/src/error.rs

//! 定义传输层与解码器的错误类型。

use thiserror::Error;

/// 传输层的统一错误类型。
#[derive(Error, Debug)]
pub enum TransportError {
    /// 无法建立底层连接：DNS/TCP/TLS 失败，或 WebSocket 升级握手未成功。
    #[error("连接失败: {0}")]
    Connect(String),

    /// 连接尝试在限定时间内未完成。
    #[error("连接超时 ({0:?})")]
    ConnectTimeout(std::time::Duration),

    /// 无效的端点 URL 格式。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 凭证无法放入握手请求头。重试不会成功。
    #[error("无效的凭证: {0}")]
    InvalidCredential(String),

    /// 未连接错误，在连接未处于打开状态时尝试发送。
    #[error("未连接")]
    NotConnected,

    /// WebSocket 协议相关的错误。
    #[error("WebSocket协议错误: {0}")]
    Protocol(#[from] tokio_tungstenite::tungstenite::Error),

    /// 底层 I/O 错误，例如监听端口绑定失败。
    #[error("I/O错误: {0}")]
    Io(#[from] std::io::Error),

    /// 出站控制帧序列化失败。
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 单条入站记录解码失败的原因。
///
/// 解码失败只影响当前这一条记录：调用方记录日志并丢弃，连接保持打开。
#[derive(Error, Debug)]
pub enum DecodeError {
    /// 不是合法的 JSON。
    #[error("帧不是合法的 JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// JSON 合法但顶层不是对象。
    #[error("帧顶层不是 JSON 对象")]
    NotAnObject,

    /// 缺少 `channel` 字段，或其类型不是字符串。
    #[error("帧缺少字符串类型的 channel 字段")]
    MissingChannel,

    /// `channel` 字段为空字符串。
    #[error("帧的 channel 字段为空")]
    EmptyChannel,
}

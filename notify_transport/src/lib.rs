//! `notify_transport` 是通知通道客户端的传输层 Crate。
//!
//! 主要模块包括：
//! - `client`: 传输连接 (`TransportConnection`) 与端点 URL 工具。
//! - `codec`: 入站帧解码为 `Envelope`，出站控制帧编码。
//! - `error`: 传输错误 `TransportError` 与解码错误 `DecodeError`。
//! - `server`: 最小推送服务端，用于测试与本地联调。

pub mod client;
pub mod codec;
pub mod error;
pub mod server;

pub use client::{ConnectOptions, TransportConnection, TransportEvent, TransportSender, bearer_header};
pub use error::{DecodeError, TransportError};

// notify_transport/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! - `transport`: 传输连接。负责建立到单个端点的连接、心跳保活、收发原始文本帧，
//!   并以事件 (`Opened` / `Message` / `Closed`) 的形式通知其所有者。不做自动重连，
//!   重连由上层的连接监管器负责。
//! - `endpoint`: 端点 URL 的解析与推导。

pub mod endpoint;
pub mod transport;

pub use transport::{ConnectOptions, TransportConnection, TransportEvent, TransportSender, bearer_header};

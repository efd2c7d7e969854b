// notify_transport/src/server/mod.rs

//! WebSocket 推送服务端模块。
//!
//! 提供一个最小的推送服务端：监听端口、完成握手 (记录请求路径与 `Authorization` 头)，
//! 并把每个连接交给调用方提供的异步处理函数。集成测试和本地联调使用它来模拟通知服务，
//! 包括主动推送信封、读取客户端的控制帧、以及模拟连接异常断开。

pub mod transport;

pub use transport::{PushConnection, PushServer};

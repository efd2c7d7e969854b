// seismic_notify/src/ws_client/mod.rs

//! 通知通道客户端核心逻辑模块。
//!
//! - `service`: 对外句柄 `NotifyClient`，负责订阅管理、状态查询、原始帧发送和关闭。
//! - `supervisor`: 连接监管任务，独占传输连接，负责建立连接、退避重连、重放频道加入
//!   以及把解码后的消息分发给订阅者。

pub mod service;
mod supervisor;

pub use service::NotifyClient;

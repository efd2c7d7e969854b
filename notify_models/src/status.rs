//! 连接状态事件负载。

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::enums::ConnectionState;

/// `ConnectionStatusEvent` 在连接状态发生变化时由客户端构建，交给遥测接收器。
///
/// 消费方 (例如界面层) 可以据此展示“重连中”之类的提示。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionStatusEvent {
    /// 变化前的状态。
    pub from: ConnectionState,
    /// 变化后的状态。
    pub to: ConnectionState,
    /// 可选的说明，例如断开原因或连接失败的错误信息。
    pub detail: Option<String>,
    /// 事件产生时的 UTC 毫秒时间戳。
    pub timestamp: i64,
}

impl ConnectionStatusEvent {
    /// 以当前时间创建状态事件。
    pub fn new(from: ConnectionState, to: ConnectionState, detail: Option<String>) -> Self {
        Self { from, to, detail, timestamp: Utc::now().timestamp_millis() }
    }
}

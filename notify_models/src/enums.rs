//! 通用枚举模块。
//!
//! 定义连接生命周期相关的枚举类型。状态机本身由 `seismic_notify` 的连接监管器驱动，
//! 这里只负责类型的表示与序列化。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 通知客户端的连接状态。
///
/// 状态迁移路径：`Disconnected → Connecting → Connected → Reconnecting → Connecting ...`，
/// 任意状态在调用 `shutdown()` 后进入终态 `Closed`。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// 尚未开始连接。
    #[default]
    Disconnected,
    /// 正在建立传输连接 (TCP/TLS/WebSocket 握手)。
    Connecting,
    /// 传输连接已打开，频道加入已重放。
    Connected,
    /// 连接失败或断开，正在等待退避延迟后重连。
    Reconnecting,
    /// 已关闭 (终态)，不会再发起任何连接。
    Closed,
}

impl ConnectionState {
    /// 是否为终态。
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 传输连接关闭的原因。
///
/// 每个连接生命周期内 `Closed` 事件只触发一次，原因区分三种情况：
/// 本地主动关闭、远端关闭、网络/协议故障。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 本地主动关闭 (例如调用了 `shutdown()`)。
    Local,
    /// 远端发送了 Close 帧或正常结束了流。
    Remote {
        /// WebSocket 关闭码 (如果对方提供了)。
        code: Option<u16>,
        /// 关闭说明文本。
        reason: String,
    },
    /// 网络故障、协议错误或心跳超时。
    Failure(String),
}

impl CloseReason {
    /// 是否由本地发起。
    pub fn is_local(&self) -> bool {
        matches!(self, CloseReason::Local)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => write!(f, "本地关闭"),
            CloseReason::Remote { code: Some(code), reason } => {
                write!(f, "远端关闭 (code={}, reason='{}')", code, reason)
            }
            CloseReason::Remote { code: None, reason } => write!(f, "远端关闭 ('{}')", reason),
            CloseReason::Failure(detail) => write!(f, "连接故障: {}", detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_connection_state_default_and_terminal() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());

        // 状态可以作为 HashSet 的键，便于测试中收集观察到的状态
        let seen: HashSet<ConnectionState> =
            [ConnectionState::Connecting, ConnectionState::Connecting, ConnectionState::Connected]
                .into_iter()
                .collect();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_close_reason_display_distinguishes_causes() {
        assert!(CloseReason::Local.is_local());
        let remote = CloseReason::Remote { code: Some(1000), reason: "bye".to_string() };
        assert!(remote.to_string().contains("1000"));
        let failure = CloseReason::Failure("keepalive timeout".to_string());
        assert!(failure.to_string().contains("keepalive timeout"));
        assert!(!failure.is_local());
    }
}

// seismic_notify/src/event.rs

//! 通知客户端对外发布的运行事件。
//!
//! 连接状态变化、解码失败、订阅者回调失败都会交给 `TelemetrySink`。
//! 默认实现 `LogTelemetry` 只通过 `log` 门面写日志；需要接入界面状态栏或监控系统时，
//! 实现这个 trait 并在 `NotifyClient::start` 时传入即可。

use log::{info, warn};
use notify_models::{ConnectionState, ConnectionStatusEvent};
use notify_transport::DecodeError;
use uuid::Uuid;

use crate::error::CallbackError;

/// 日志中原始帧最多截取的字符数。
const RAW_PREVIEW_CHARS: usize = 120;

/// 运行事件接收方。所有方法都有空的默认实现，只需覆盖关心的事件。
///
/// 这些方法在连接监管任务中同步调用，不应阻塞。方法内的 panic 会被捕获并记录，
/// 不影响连接和消息分发。
pub trait TelemetrySink: Send + Sync + 'static {
    fn on_state_change(&self, _event: &ConnectionStatusEvent) {}

    fn on_decode_failure(&self, _raw: &str, _error: &DecodeError) {}

    fn on_callback_failure(&self, _channel: &str, _subscription_id: Uuid, _error: &CallbackError) {}
}

/// 通过 `log` 写日志的默认实现。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn on_state_change(&self, event: &ConnectionStatusEvent) {
        let detail = event.detail.as_deref().unwrap_or("-");
        match event.to {
            ConnectionState::Reconnecting => {
                warn!("[通知客户端] 连接状态: {} -> {} (原因: {})", event.from, event.to, detail)
            }
            _ => info!("[通知客户端] 连接状态: {} -> {} (原因: {})", event.from, event.to, detail),
        }
    }

    fn on_decode_failure(&self, raw: &str, error: &DecodeError) {
        warn!("[通知客户端] 丢弃无法解码的消息: {}。原始内容: '{}'", error, preview(raw));
    }

    fn on_callback_failure(&self, channel: &str, subscription_id: Uuid, error: &CallbackError) {
        warn!("[通知客户端] 频道 '{}' 的订阅者 {} 处理消息失败: {}", channel, subscription_id, error);
    }
}

fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(RAW_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_frames() {
        assert_eq!(preview("short"), "short");
        let long = "频".repeat(RAW_PREVIEW_CHARS + 5);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), RAW_PREVIEW_CHARS + 3);
    }
}

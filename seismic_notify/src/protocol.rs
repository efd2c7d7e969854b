// seismic_notify/src/protocol.rs

//! 频道加入/离开协议。
//!
//! 多个频道共用同一条连接时，客户端需要告诉服务端自己关心哪些频道。
//! 帧的具体格式由服务端决定，因此抽象为 `ChannelProtocol` trait。

use log::error;
use notify_models::ControlFrame;
use notify_transport::codec;

/// 生成加入/离开频道时发送给服务端的帧。
///
/// 返回 `None` 表示该协议不需要显式发送帧 (例如频道编码在连接 URL 中)。
pub trait ChannelProtocol: Send + Sync + 'static {
    fn join_frame(&self, channel: &str) -> Option<String>;
    fn leave_frame(&self, channel: &str) -> Option<String>;
}

/// 默认协议: `{"type":"join","channel":"..."}` / `{"type":"leave","channel":"..."}`。
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonControlProtocol;

impl JsonControlProtocol {
    fn encode(frame: ControlFrame) -> Option<String> {
        match codec::encode_control(&frame) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("[频道协议] 序列化 {} 帧失败 (频道 '{}'): {}", frame.message_type(), frame.channel(), e);
                None
            }
        }
    }
}

impl ChannelProtocol for JsonControlProtocol {
    fn join_frame(&self, channel: &str) -> Option<String> {
        Self::encode(ControlFrame::Join { channel: channel.to_string() })
    }

    fn leave_frame(&self, channel: &str) -> Option<String> {
        Self::encode(ControlFrame::Leave { channel: channel.to_string() })
    }
}

/// 服务端按连接 URL 决定推送内容、不接受控制帧时使用。
#[derive(Debug, Default, Clone, Copy)]
pub struct ImplicitJoinProtocol;

impl ChannelProtocol for ImplicitJoinProtocol {
    fn join_frame(&self, _channel: &str) -> Option<String> {
        None
    }

    fn leave_frame(&self, _channel: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_json_control_frames() {
        let join: Value = serde_json::from_str(&JsonControlProtocol.join_frame("asset:42").unwrap()).unwrap();
        assert_eq!(join, json!({ "type": "join", "channel": "asset:42" }));
        let leave: Value = serde_json::from_str(&JsonControlProtocol.leave_frame("asset:42").unwrap()).unwrap();
        assert_eq!(leave, json!({ "type": "leave", "channel": "asset:42" }));
    }

    #[test]
    fn test_implicit_join_sends_nothing() {
        assert!(ImplicitJoinProtocol.join_frame("jobs").is_none());
        assert!(ImplicitJoinProtocol.leave_frame("jobs").is_none());
    }
}

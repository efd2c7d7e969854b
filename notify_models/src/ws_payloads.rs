//! 包含客户端发往服务端的控制帧定义。
//!
//! 服务端推送的业务消息是不透明的信封 (见 `envelope`)；客户端自身只会发送少量控制消息，
//! 用于在多路复用的单个连接上声明对哪些频道感兴趣。

use serde::{Deserialize, Serialize};

/// 控制帧类型：加入频道。
pub const JOIN_MESSAGE_TYPE: &str = "join";
/// 控制帧类型：退出频道。
pub const LEAVE_MESSAGE_TYPE: &str = "leave";

/// 客户端控制帧。
///
/// 序列化后形如 `{"type":"join","channel":"asset:42"}`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// 请求服务端开始向本连接推送该频道的消息。
    Join { channel: String },
    /// 请求服务端停止推送该频道的消息。
    Leave { channel: String },
}

impl ControlFrame {
    /// 控制帧所针对的频道。
    pub fn channel(&self) -> &str {
        match self {
            ControlFrame::Join { channel } | ControlFrame::Leave { channel } => channel,
        }
    }

    /// 控制帧的类型字符串，与 `type` 字段一致。
    pub fn message_type(&self) -> &'static str {
        match self {
            ControlFrame::Join { .. } => JOIN_MESSAGE_TYPE,
            ControlFrame::Leave { .. } => LEAVE_MESSAGE_TYPE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_frame_wire_shape() {
        let join = ControlFrame::Join { channel: "asset:42".to_string() };
        let json = serde_json::to_value(&join).expect("序列化 join 帧失败");
        assert_eq!(json["type"], JOIN_MESSAGE_TYPE);
        assert_eq!(json["channel"], "asset:42");

        let leave: ControlFrame =
            serde_json::from_str(r#"{"type":"leave","channel":"jobs"}"#).expect("解析 leave 帧失败");
        assert_eq!(leave.channel(), "jobs");
        assert_eq!(leave.message_type(), LEAVE_MESSAGE_TYPE);
    }
}

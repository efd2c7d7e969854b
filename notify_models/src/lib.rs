//! `notify_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了通知通道客户端各组件 (`notify_transport` 传输层、
//! `seismic_notify` 客户端服务) 之间共享的数据结构和枚举类型。
//!
//! 主要包含：
//! - **通用枚举 (`enums`)**: 连接状态 `ConnectionState`、连接关闭原因 `CloseReason`。
//! - **消息信封 (`envelope`)**: 服务端推送的每条消息解码后的 `{channel, data}` 结构。
//! - **控制帧 (`ws_payloads`)**: 客户端发往服务端的频道加入/退出等控制消息。
//! - **状态事件 (`status`)**: 连接状态变化时对外发布的事件负载。
//!
//! 所有模型都派生 `Serialize`/`Deserialize`/`Debug`/`Clone`，以便跨组件传递和记录日志。

pub mod enums;
pub mod envelope;
pub mod status;
pub mod ws_payloads;

pub use enums::{CloseReason, ConnectionState};
pub use envelope::Envelope;
pub use status::ConnectionStatusEvent;
pub use ws_payloads::ControlFrame;

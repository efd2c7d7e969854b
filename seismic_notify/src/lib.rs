// seismic_notify/src/lib.rs

//! `seismic_notify`: 多频道实时通知客户端。
//!
//! 客户端维护一条到服务端推送通道的连接，把收到的每条消息解码为 `Envelope`，
//! 再按频道名分发给所有订阅者。连接断开后按指数退避自动重连，并重新加入所有仍有订阅者的频道，
//! 订阅者对此无感知。
//!
//! ```no_run
//! use seismic_notify::{NotifyClient, NotifyConfig};
//!
//! # async fn demo() -> Result<(), seismic_notify::NotifyError> {
//! let client = NotifyClient::new(NotifyConfig::new("wss://mam.example.com/notify").with_credential("token"))?;
//! let handle = client.subscribe("asset:42", |envelope| {
//!     println!("{}", envelope.data);
//!     Ok(())
//! })?;
//! // ...
//! client.unsubscribe(&handle);
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod router;
pub mod stats;
pub mod ws_client;

pub use config::{NotifyConfig, ReconnectConfig};
pub use error::{BoxError, CallbackError, NotifyError};
pub use event::{LogTelemetry, TelemetrySink};
pub use protocol::{ChannelProtocol, ImplicitJoinProtocol, JsonControlProtocol};
pub use router::{ChannelRouter, DispatchReport, SubscriptionHandle};
pub use stats::ClientStats;
pub use ws_client::NotifyClient;

pub use notify_models::{CloseReason, ConnectionState, ConnectionStatusEvent, Envelope};

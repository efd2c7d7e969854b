// seismic_notify/src/config.rs

//! 通知客户端的配置管理模块。
//!
//! 配置既可以在代码中构建 (`NotifyConfig::new`)，也可以从 JSON 文件加载
//! (`NotifyConfig::load_from_file`)。所有字段都有默认值，文件中只需写出需要覆盖的项。

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use notify_transport::client::endpoint::parse_endpoint;
use notify_transport::client::transport::DEFAULT_EVENT_QUEUE_CAPACITY;
use notify_transport::{bearer_header, ConnectOptions};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// 默认的通知端点。
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8088/notify";

/// 重连退避配置。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// 第一次重连前的等待时间 (毫秒)。
    pub base_delay_ms: u64,
    /// 重连等待时间上限 (毫秒)。
    pub max_delay_ms: u64,
    /// 每次失败后等待时间的增长倍数，必须不小于 1。
    pub multiplier: f64,
    /// 向上随机抖动的比例，取值 `[0, 1]`，例如 0.25 表示最多增加 25%。
    pub jitter: f64,
    /// 连接至少保持这么久 (毫秒) 才视为恢复，之后的断开从 `base_delay_ms` 重新计算。
    pub stable_after_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { base_delay_ms: 1_000, max_delay_ms: 30_000, multiplier: 2.0, jitter: 0.25, stable_after_ms: 5_000 }
    }
}

/// 通知客户端配置。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// 通知服务的 WebSocket 端点，例如 `"wss://mam.example.com/notify"`。
    pub endpoint: String,
    /// 已获取的访问凭证，握手时以 Bearer 方式附带。
    pub credential: Option<String>,
    /// 单次连接尝试的超时时间 (毫秒)。
    pub connect_timeout_ms: u64,
    /// Ping 保活间隔 (毫秒)，0 表示禁用。
    pub keepalive_interval_ms: u64,
    /// Ping 之后允许的额外静默时间 (毫秒)。
    pub pong_timeout_ms: u64,
    /// 尚未分发的入站帧最多缓冲多少条，满了以后暂停读取连接。
    pub event_queue_capacity: usize,
    /// 重连退避配置。
    pub reconnect: ReconnectConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credential: None,
            connect_timeout_ms: 10_000,
            keepalive_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl NotifyConfig {
    /// 以默认参数创建指向 `endpoint` 的配置。
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }

    /// 设置访问凭证。
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// 从 JSON 文件加载配置并校验。
    ///
    /// # 返回值
    /// * `Err(anyhow::Error)` - 文件无法读取、不是合法 JSON，或内容未通过 `validate`，
    ///   错误中带有文件路径等上下文信息。
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取通知客户端配置文件 '{}'", path.display()))?;
        let config: NotifyConfig = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件 '{}' 失败，内容必须是合法的 JSON", path.display()))?;
        config
            .validate()
            .with_context(|| format!("配置文件 '{}' 校验失败", path.display()))?;
        log::info!(
            "[通知配置] 已从 '{}' 加载配置，端点: {}",
            path.display(),
            config.endpoint
        );
        Ok(config)
    }

    /// 校验配置取值。
    pub fn validate(&self) -> Result<(), NotifyError> {
        parse_endpoint(&self.endpoint).map_err(|e| NotifyError::Config(e.to_string()))?;
        if let Some(credential) = self.credential.as_deref() {
            bearer_header(credential).map_err(|e| NotifyError::Config(e.to_string()))?;
        }
        if self.connect_timeout_ms == 0 {
            return Err(NotifyError::Config("connect_timeout_ms 必须大于 0".to_string()));
        }
        if self.event_queue_capacity == 0 {
            return Err(NotifyError::Config("event_queue_capacity 必须大于 0".to_string()));
        }
        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(NotifyError::Config("reconnect.base_delay_ms 必须大于 0".to_string()));
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(NotifyError::Config(format!(
                "reconnect.max_delay_ms ({}) 不能小于 base_delay_ms ({})",
                reconnect.max_delay_ms, reconnect.base_delay_ms
            )));
        }
        if !(reconnect.multiplier >= 1.0 && reconnect.multiplier.is_finite()) {
            return Err(NotifyError::Config(format!(
                "reconnect.multiplier ({}) 必须是不小于 1 的有限数",
                reconnect.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter) {
            return Err(NotifyError::Config(format!(
                "reconnect.jitter ({}) 必须位于 [0, 1]",
                reconnect.jitter
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 转换为传输层的连接参数。
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            credential: self.credential.clone(),
            connect_timeout: self.connect_timeout(),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            pong_timeout: Duration::from_millis(self.pong_timeout_ms),
            event_queue_capacity: self.event_queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn write_temp_config(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("seismic_notify_{}.json", Uuid::new_v4()));
        fs::write(&path, content).expect("写入临时配置文件失败");
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = NotifyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let path = write_temp_config(
            r#"{ "endpoint": "wss://mam.example.com/notify", "reconnect": { "base_delay_ms": 500 } }"#,
        );
        let config = NotifyConfig::load_from_file(&path).expect("部分配置应能加载");
        let _ = fs::remove_file(&path);

        assert_eq!(config.endpoint, "wss://mam.example.com/notify");
        assert_eq!(config.reconnect.base_delay_ms, 500);
        assert_eq!(config.reconnect.max_delay_ms, 30_000, "未写出的字段应取默认值");
        assert_eq!(config.keepalive_interval_ms, 30_000);
    }

    #[test]
    fn test_load_rejects_invalid_content() {
        let broken = write_temp_config("{ not json");
        assert!(NotifyConfig::load_from_file(&broken).is_err());
        let _ = fs::remove_file(&broken);

        let bad_scheme = write_temp_config(r#"{ "endpoint": "http://example.com/notify" }"#);
        let err = NotifyConfig::load_from_file(&bad_scheme).expect_err("http 端点应被拒绝");
        let _ = fs::remove_file(&bad_scheme);
        assert!(format!("{:#}", err).contains("校验失败"));

        assert!(NotifyConfig::load_from_file("/definitely/missing/notify.json").is_err());
    }

    #[test]
    fn test_validate_reconnect_bounds() {
        let mut config = NotifyConfig::new("ws://localhost/notify");
        config.reconnect.max_delay_ms = 10;
        config.reconnect.base_delay_ms = 100;
        assert!(matches!(config.validate(), Err(NotifyError::Config(_))));

        let mut config = NotifyConfig::new("ws://localhost/notify");
        config.reconnect.jitter = 1.5;
        assert!(config.validate().is_err());

        let mut config = NotifyConfig::new("ws://localhost/notify");
        config.reconnect.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_options_carry_credential() {
        let options = NotifyConfig::new("ws://localhost/notify").with_credential("abc").connect_options();
        assert_eq!(options.credential.as_deref(), Some("abc"));
        assert_eq!(options.keepalive_interval, Duration::from_secs(30));
        assert_eq!(options.event_queue_capacity, DEFAULT_EVENT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_validate_rejects_unsendable_credential() {
        let config = NotifyConfig::new("ws://localhost/notify").with_credential("tok\nen");
        assert!(matches!(config.validate(), Err(NotifyError::Config(_))));
        assert!(NotifyConfig::new("ws://localhost/notify").with_credential("tok-en").validate().is_ok());
    }

    #[test]
    fn test_event_queue_capacity_from_file() {
        let path = write_temp_config(r#"{ "endpoint": "ws://localhost/notify", "event_queue_capacity": 16 }"#);
        let config = NotifyConfig::load_from_file(&path).expect("配置应能加载");
        let _ = fs::remove_file(&path);
        assert_eq!(config.connect_options().event_queue_capacity, 16);

        let mut config = NotifyConfig::new("ws://localhost/notify");
        config.event_queue_capacity = 0;
        assert!(matches!(config.validate(), Err(NotifyError::Config(_))));
    }
}

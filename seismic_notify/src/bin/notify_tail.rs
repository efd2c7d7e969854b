// seismic_notify/src/bin/notify_tail.rs

//! 命令行工具: 订阅若干频道并把收到的每条消息以 JSON 行打印到标准输出。
//!
//! 用法: `notify_tail <ws-url> <channel>...`
//!
//! 环境变量:
//! - `SEISMIC_NOTIFY_TOKEN`: 访问凭证 (可选)。
//! - `SEISMIC_NOTIFY_CONFIG`: 配置文件路径 (可选)，文件中的端点会被命令行参数覆盖。
//! - `RUST_LOG`: 日志级别，默认 `info`。

use std::env;

use anyhow::{bail, Context, Result};
use log::{info, LevelFilter};
use seismic_notify::{ConnectionState, NotifyClient, NotifyConfig};

const TOKEN_ENV: &str = "SEISMIC_NOTIFY_TOKEN";
const CONFIG_ENV: &str = "SEISMIC_NOTIFY_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init()
        .context("初始化 env_logger 日志服务失败")?;

    let mut args = env::args().skip(1);
    let Some(endpoint) = args.next() else {
        bail!("用法: notify_tail <ws-url> <channel>...");
    };
    let channels: Vec<String> = args.collect();
    if channels.is_empty() {
        bail!("至少需要指定一个频道。用法: notify_tail <ws-url> <channel>...");
    }

    let mut config = match env::var(CONFIG_ENV) {
        Ok(path) => NotifyConfig::load_from_file(&path)?,
        Err(_) => NotifyConfig::default(),
    };
    config.endpoint = endpoint;
    if let Ok(token) = env::var(TOKEN_ENV) {
        config.credential = Some(token);
    }

    let client = NotifyClient::new(config).context("创建通知客户端失败")?;
    for channel in &channels {
        client
            .subscribe(channel, |envelope| {
                println!("{}", serde_json::to_string(envelope)?);
                Ok(())
            })
            .with_context(|| format!("订阅频道 '{}' 失败", channel))?;
    }
    info!("[notify_tail] 已订阅 {} 个频道: {:?}", channels.len(), channels);

    let mut states = client.state_changes();
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() == ConnectionState::Closed {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("监听 Ctrl-C 失败")?;
                info!("[notify_tail] 收到 Ctrl-C，正在关闭...");
                break;
            }
        }
    }

    client.shutdown().await;
    let stats = client.stats();
    info!(
        "[notify_tail] 共分发 {} 条消息，解码失败 {} 条，重连 {} 次。",
        stats.messages_dispatched, stats.decode_failures, stats.reconnects
    );
    Ok(())
}

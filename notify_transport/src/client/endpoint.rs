// notify_transport/src/client/endpoint.rs

//! 端点 URL 的解析与推导。
//!
//! 通知服务只有一个流式端点。浏览器场景下端点从当前页面的 origin 推导而来
//! (`http` → `ws`，`https` → `wss`)；旧式的单频道服务把频道名作为路径段嵌入 URL，
//! 这里也提供相应的构造函数。

use url::Url;

use crate::error::TransportError;

/// 解析并校验一个 WebSocket 端点 URL，只接受 `ws` 与 `wss`。
pub fn parse_endpoint(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw)
        .map_err(|e| TransportError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::InvalidUrl(format!(
            "不支持的协议 '{}' (URL: '{}')，只接受 ws/wss",
            other, raw
        ))),
    }
}

/// 由页面 origin 与端点路径推导 WebSocket 端点。
///
/// # Arguments
/// * `origin` - 页面 origin，例如 `https://mam.example.com`。也接受 `ws`/`wss`。
/// * `path` - 端点路径，例如 `/notify`。
pub fn from_origin(origin: &str, path: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(origin)
        .map_err(|e| TransportError::InvalidUrl(format!("无效的 origin '{}': {}", origin, e)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "无法从协议 '{}' 推导 WebSocket 端点 (origin: '{}')",
                other, origin
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidUrl(format!("无法为 '{}' 设置协议 {}", origin, scheme)))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// 在端点路径末尾追加频道名路径段 (自动进行百分号编码)。
pub fn with_channel_segment(endpoint: &Url, channel: &str) -> Result<Url, TransportError> {
    if channel.is_empty() {
        return Err(TransportError::InvalidUrl("频道名不能为空".to_string()));
    }
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUrl(format!("URL '{}' 不能追加路径段", endpoint)))?
        .pop_if_empty()
        .push(channel);
    Ok(url)
}

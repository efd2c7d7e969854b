// notify_transport/src/codec.rs

//! 入站帧解码与出站控制帧编码。
//!
//! 入站帧是文本形式的 JSON 对象，至少包含 `channel` 字段和 `data` (或 `payload`) 字段；
//! 一个传输帧中可以携带多条以换行分隔的记录。除这两个字段外的内容均视为不透明。
//! 解码是纯函数：无状态、无副作用，失败只影响当前记录。

use notify_models::{ControlFrame, Envelope};
use serde_json::Value;

use crate::error::{DecodeError, TransportError};

/// 将单条原始记录解码为 `Envelope`。
///
/// # Returns
/// * `Ok(Envelope)` - 记录是 JSON 对象且带有非空的字符串 `channel` 字段。
///   缺失数据字段时 `data` 为 `null`。
/// * `Err(DecodeError)` - 记录不是合法 JSON、不是对象，或 `channel` 缺失/为空。
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(DecodeError::Malformed)?;
    envelope_from_value(value)
}

/// 将一个传输帧解码为若干条记录的结果。
///
/// 整帧是一个合法 JSON 值时 (包括跨多行的格式化 JSON) 按单条记录处理；
/// 否则按换行拆分，跳过空行，逐条独立解码，某一行出错不会影响同帧中的其他记录。
pub fn decode_frame(raw: &str) -> Vec<Result<Envelope, DecodeError>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return vec![envelope_from_value(value)];
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(decode)
        .collect()
}

/// 将控制帧序列化为可直接发送的文本帧。
pub fn encode_control(frame: &ControlFrame) -> Result<String, TransportError> {
    Ok(serde_json::to_string(frame)?)
}

fn envelope_from_value(value: Value) -> Result<Envelope, DecodeError> {
    let Value::Object(mut map) = value else {
        return Err(DecodeError::NotAnObject);
    };
    let channel = match map.remove("channel") {
        Some(Value::String(channel)) => channel,
        _ => return Err(DecodeError::MissingChannel),
    };
    if channel.is_empty() {
        return Err(DecodeError::EmptyChannel);
    }
    // data 优先，payload 作为兼容字段
    let data = map
        .remove("data")
        .or_else(|| map.remove("payload"))
        .unwrap_or(Value::Null);
    Ok(Envelope { channel, data })
}

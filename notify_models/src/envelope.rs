//! 定义服务端推送消息解码后的信封结构。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `Envelope` 代表从一条入站帧中解码出的 `{channel, data}` 二元组。
///
/// 信封是瞬态的：由解码器为每条入站记录构造，分发给订阅者后立即丢弃，不做保留。
/// `data` 是不透明的 JSON 值，其内部结构由服务端定义，客户端不做任何解释。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    /// 频道名称，用于精确匹配订阅者。
    pub channel: String,

    /// 消息负载。入站时也接受 `payload` 作为字段名。
    #[serde(default, alias = "payload")]
    pub data: serde_json::Value,
}

impl Envelope {
    /// 创建一个新的信封。
    pub fn new(channel: impl Into<String>, data: serde_json::Value) -> Self {
        Self { channel: channel.into(), data }
    }

    /// 将负载反序列化为指定的业务类型 `T`。
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq)]
    struct AssetStatus {
        status: String,
    }

    #[test]
    fn test_envelope_data_as_typed_payload() {
        let envelope = Envelope::new("asset:42", json!({ "status": "done" }));
        let typed: AssetStatus = envelope.data_as().expect("负载应能解析为 AssetStatus");
        assert_eq!(typed, AssetStatus { status: "done".to_string() });
    }

    #[test]
    fn test_envelope_accepts_payload_alias() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"channel":"jobs","payload":[1,2]}"#).expect("应接受 payload 别名");
        assert_eq!(envelope.data, json!([1, 2]));
    }

    #[test]
    fn test_envelope_type_mismatch_is_error() {
        let envelope = Envelope::new("asset:42", json!("plain text"));
        assert!(envelope.data_as::<AssetStatus>().is_err());
    }
}

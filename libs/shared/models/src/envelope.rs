use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Body shape the backend wraps most payloads in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: Option<bool>,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Decodes `payload.data` when the payload is an envelope, the payload itself
/// otherwise. Some endpoints answer with bare arrays.
pub fn unwrap_data<T: DeserializeOwned>(payload: Value) -> Result<T, serde_json::Error> {
    let inner = match payload {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(inner)
}

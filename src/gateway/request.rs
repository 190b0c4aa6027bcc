use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{MeterError, Result};

/// Chat-completion request body. Only `model` and `stream` are interpreted; every other field is
/// forwarded to the backend untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(MeterError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|err| MeterError::InvalidRequest(err.to_string()))
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Body sent upstream: the request with `stream` set explicitly.
    pub fn to_backend_body(&self, stream: bool) -> Self {
        self.clone().with_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keeps_unknown_fields_for_backend() {
        let request = ChatCompletionRequest::from_value(json!({
            "model": "gpt-4o",
            "messages": [{ "role": "user", "content": "Hello" }],
            "temperature": 0.2,
            "stream_options": { "include_usage": true }
        }))
        .expect("request");
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert!(!request.is_stream());

        let body = serde_json::to_value(request.to_backend_body(true)).expect("body");
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["temperature"], json!(0.2));
        assert_eq!(body["stream_options"]["include_usage"], json!(true));
        assert_eq!(body["messages"][0]["content"], json!("Hello"));
    }

    #[test]
    fn non_streaming_body_sets_stream_false() {
        let request = ChatCompletionRequest::new("gpt-4o");
        let body = serde_json::to_value(request.to_backend_body(false)).expect("body");
        assert_eq!(body, json!({ "model": "gpt-4o", "stream": false }));
    }

    #[test]
    fn rejects_mistyped_fields() {
        assert!(ChatCompletionRequest::from_value(json!({ "model": 5 })).is_err());
        assert!(ChatCompletionRequest::from_value(json!({ "stream": "yes" })).is_err());
        assert!(ChatCompletionRequest::from_value(json!("hello")).is_err());
    }
}

use crate::stream::{error_message, ByteStream, TransportError};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Body of the gateway chat routes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
}

/// A non-streamed answer, normalized from whichever shape the upstream used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReply {
    pub text: String,
    pub model: Option<String>,
}

impl CompletionReply {
    /// Accepts `{"message": ...}` (gateway) and
    /// `{"choices": [{"message": {"content": ...}}]}` (OpenAI-compatible).
    pub fn from_json(v: &Value) -> Result<Self, UpstreamError> {
        if let Some(err) = v.get("error").and_then(error_message) {
            return Err(UpstreamError::new(None, err));
        }

        let model = v.get("model").and_then(Value::as_str).map(str::to_string);

        if let Some(text) = v.get("message").and_then(Value::as_str) {
            return Ok(Self { text: text.to_string(), model });
        }

        let content = v
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/message/content"))
            .and_then(Value::as_str);

        match content {
            Some(text) => Ok(Self { text: text.to_string(), model }),
            None => Err(UpstreamError::new(None, "upstream reply has no message content")),
        }
    }
}

pub enum Reply {
    Stream(ByteStream),
    Complete(CompletionReply),
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Stream(_) => f.write_str("Reply::Stream(..)"),
            Reply::Complete(c) => f.debug_tuple("Reply::Complete").field(c).finish(),
        }
    }
}

/// Error payload or failure status reported by the provider itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build from a non-2xx response body.
    pub fn from_body(status: reqwest::StatusCode, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(error_message));
        let message = match parsed {
            Some(m) => m,
            None => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                if text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {text}")
                }
            }
        };
        Self::new(Some(status.as_u16()), message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.into())
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<Reply, ProviderError>> + Send>>;

/// Provider interface.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Issue the request; streaming providers return as soon as headers arrive.
    fn send(&self, req: ChatRequest) -> ProviderFuture;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_gateway_shape() {
        let r = CompletionReply::from_json(&json!({"message": "hello", "model": "Groq x"})).unwrap();
        assert_eq!(r.text, "hello");
        assert_eq!(r.model.as_deref(), Some("Groq x"));
    }

    #[test]
    fn normalizes_choices_shape() {
        let r = CompletionReply::from_json(&json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}]
        }))
        .unwrap();
        assert_eq!(r, CompletionReply { text: "hi".into(), model: None });
    }

    #[test]
    fn error_payload_and_missing_content() {
        let e = CompletionReply::from_json(&json!({"error": {"message": "bad key"}})).unwrap_err();
        assert_eq!(e.message, "bad key");
        assert!(CompletionReply::from_json(&json!({"choices": []})).is_err());
    }

    #[test]
    fn upstream_error_from_status_body() {
        let e = UpstreamError::from_body(reqwest::StatusCode::NOT_FOUND, br#"{"error":"model 'x' not found"}"#);
        assert_eq!(e.status, Some(404));
        assert_eq!(e.message, "model 'x' not found");

        let e = UpstreamError::from_body(reqwest::StatusCode::BAD_GATEWAY, b"");
        assert_eq!(e.message, "HTTP 502 Bad Gateway");
    }
}

use super::{ChatRequest, CompletionReply, Provider, ProviderError, ProviderFuture, Reply, UpstreamError};
use crate::stream::TransportError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_CLOUD_BASE: &str = "https://api.groq.com/openai/v1/";

/// OpenAI-compatible chat completions endpoint, called without streaming.
#[derive(Debug, Clone)]
pub struct CloudProvider {
    http: reqwest::Client,
    base: Url,
    api_key: String,
    timeout: Option<Duration>,
}

impl CloudProvider {
    pub fn new(http: reqwest::Client, base: Url, api_key: String) -> Self {
        Self {
            http,
            base,
            api_key,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let v = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| TransportError::Connect("API key is not a valid header value".into()))?;
        h.insert(AUTHORIZATION, v);
        Ok(h)
    }
}

impl Provider for CloudProvider {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn send(&self, req: ChatRequest) -> ProviderFuture {
        let this = self.clone();

        Box::pin(async move {
            let url = this
                .base
                .join("chat/completions")
                .map_err(|e| TransportError::Connect(format!("bad cloud url: {e}")))?;
            let headers = this.headers()?;

            let body = CompletionsRequest {
                model: &req.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &req.message,
                }],
                temperature: 0.7,
            };

            let mut builder = this.http.post(url).headers(headers).json(&body);
            if let Some(t) = this.timeout {
                builder = builder.timeout(t);
            }

            let resp = builder.send().await?;
            let status = resp.status();
            let bytes = resp.bytes().await?;
            if !status.is_success() {
                return Err(UpstreamError::from_body(status, &bytes).into());
            }

            let v: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| UpstreamError::new(Some(status.as_u16()), format!("invalid JSON reply: {e}")))?;
            let mut reply = CompletionReply::from_json(&v)?;
            // The echoed model id is not a display label.
            reply.model = None;
            Ok(Reply::Complete(reply))
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> CloudProvider {
        let base = Url::parse(&format!("{}/openai/v1/", server.uri())).unwrap();
        CloudProvider::new(reqwest::Client::new(), base, "test-key".into())
    }

    fn req() -> ChatRequest {
        ChatRequest {
            message: "Hi".into(),
            model: "gemma2-9b-it".into(),
        }
    }

    #[tokio::test]
    async fn posts_completion_request_and_reads_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(json!({
                "model": "gemma2-9b-it",
                "messages": [{"role": "user", "content": "Hi"}],
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gemma2-9b-it",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}}]
            })))
            .mount(&server)
            .await;

        match provider(&server).send(req()).await.unwrap() {
            Reply::Complete(c) => assert_eq!(c, CompletionReply { text: "Hello!".into(), model: None }),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_error_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Invalid API Key", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).send(req()).await.unwrap_err();
        match err {
            ProviderError::Upstream(e) => {
                assert_eq!(e.status, Some(401));
                assert_eq!(e.message, "Invalid API Key");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

use super::{ChatRequest, CompletionReply, Provider, ProviderError, ProviderFuture, Reply, UpstreamError};
use crate::stream::{ByteStream, TransportError};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Url;
use std::time::Duration;
use tokio_stream::StreamExt;

/// Chat gateway in front of the local inference daemon.
///
/// `POST /api/chat/stream` answers with `data: <json>` lines;
/// `POST /api/chat` answers with a single JSON document.
#[derive(Debug, Clone)]
pub struct GatewayProvider {
    http: reqwest::Client,
    base: Url,
    mode: GatewayMode,
    timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Streaming,
    Buffered,
}

impl GatewayProvider {
    pub fn new(http: reqwest::Client, base: Url, mode: GatewayMode) -> Self {
        Self {
            http,
            base,
            mode,
            timeout: None,
        }
    }

    /// Total deadline for buffered requests. Streams are never cut short.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> Result<Url, ProviderError> {
        let path = match self.mode {
            GatewayMode::Streaming => "api/chat/stream",
            GatewayMode::Buffered => "api/chat",
        };
        self.base
            .join(path)
            .map_err(|e| TransportError::Connect(format!("bad gateway url: {e}")).into())
    }
}

impl Provider for GatewayProvider {
    fn name(&self) -> &'static str {
        match self.mode {
            GatewayMode::Streaming => "gateway-stream",
            GatewayMode::Buffered => "gateway",
        }
    }

    fn send(&self, req: ChatRequest) -> ProviderFuture {
        let this = self.clone();

        Box::pin(async move {
            let url = this.endpoint()?;
            tracing::debug!(%url, model = %req.model, "gateway request");

            let mut builder = this.http.post(url).json(&req);
            if this.mode == GatewayMode::Streaming {
                builder = builder.header(ACCEPT, HeaderValue::from_static("text/event-stream"));
            } else if let Some(t) = this.timeout {
                builder = builder.timeout(t);
            }

            let resp = builder.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.bytes().await.unwrap_or_default();
                return Err(UpstreamError::from_body(status, &body).into());
            }

            match this.mode {
                GatewayMode::Streaming => {
                    let body = resp.bytes_stream().map(|r| r.map_err(TransportError::from));
                    Ok(Reply::Stream(Box::pin(body) as ByteStream))
                }
                GatewayMode::Buffered => {
                    let body = resp.bytes().await?;
                    let v: serde_json::Value = serde_json::from_slice(&body)
                        .map_err(|e| UpstreamError::new(Some(status.as_u16()), format!("invalid JSON reply: {e}")))?;
                    Ok(Reply::Complete(CompletionReply::from_json(&v)?))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{EventParser, StreamEvent, TransportReader};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, mode: GatewayMode) -> GatewayProvider {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        GatewayProvider::new(reqwest::Client::new(), base, mode)
    }

    fn req() -> ChatRequest {
        ChatRequest {
            message: "Hi".into(),
            model: "llama2".into(),
        }
    }

    #[tokio::test]
    async fn streaming_route_returns_body_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .and(body_json(json!({"message": "Hi", "model": "llama2"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"chunk\":\"Hi\"}\n\ndata: {\"done\":true,\"model\":\"llama2\"}\n\n",
            ))
            .mount(&server)
            .await;

        let reply = provider(&server, GatewayMode::Streaming).send(req()).await.unwrap();
        let body = match reply {
            Reply::Stream(body) => body,
            other => panic!("expected a stream, got {other:?}"),
        };

        let mut events = EventParser::new(TransportReader::new(body));
        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Chunk { text: "Hi".into() })
        );
        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Done { model: Some("llama2".into()) })
        );
        assert_eq!(events.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn buffered_route_normalizes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "hello",
                "model": "Ollama llama2",
                "timestamp": "2024-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let reply = provider(&server, GatewayMode::Buffered).send(req()).await.unwrap();
        match reply {
            Reply::Complete(c) => {
                assert_eq!(c.text, "hello");
                assert_eq!(c.model.as_deref(), Some("Ollama llama2"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "ollama is down"})))
            .mount(&server)
            .await;

        let err = provider(&server, GatewayMode::Streaming).send(req()).await.unwrap_err();
        match err {
            ProviderError::Upstream(e) => {
                assert_eq!(e.status, Some(500));
                assert_eq!(e.message, "ollama is down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let p = GatewayProvider::new(reqwest::Client::new(), base, GatewayMode::Streaming);
        let err = p.send(req()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)), "got {err:?}");
    }
}

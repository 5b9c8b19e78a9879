use super::{ChatRequest, Provider, ProviderError, ProviderFuture, Reply};
use crate::stream::{ByteStream, TransportError};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Offline provider that streams an echo of the prompt in the gateway's
/// line format.
#[derive(Debug, Clone)]
pub struct StubProvider {
    delay: Duration,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(120),
        }
    }

    #[cfg(test)]
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Wire lines the stub emits for `req`, done record included.
pub fn script(req: &ChatRequest) -> Vec<String> {
    let mut parts = vec!["You said: ".to_string()];
    parts.extend(req.message.split_inclusive(' ').map(str::to_string));
    parts.push(format!("\n\n[stub reply for {}]", req.model));

    let mut lines: Vec<String> = parts
        .into_iter()
        .map(|p| format!("data: {}\n", serde_json::json!({ "chunk": p, "model": req.model })))
        .collect();
    lines.push(format!("data: {}\n", serde_json::json!({ "done": true, "model": req.model })));
    lines
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn send(&self, req: ChatRequest) -> ProviderFuture {
        let delay = self.delay;

        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<Result<Bytes, TransportError>>(32);

            tokio::spawn(async move {
                for line in script(&req) {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if tx.send(Ok(Bytes::from(line))).await.is_err() {
                        break;
                    }
                }
            });

            let stream = ReceiverStream::new(rx);
            Ok::<_, ProviderError>(Reply::Stream(Box::pin(stream) as ByteStream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parse_line;

    #[test]
    fn script_is_valid_protocol() {
        let req = ChatRequest {
            message: "hello there".into(),
            model: "llama2".into(),
        };
        let lines = script(&req);
        let last = lines.last().unwrap().trim_end();
        assert_eq!(parse_line(last).len(), 1);

        let text: String = lines
            .iter()
            .flat_map(|l| parse_line(l.trim_end()))
            .filter_map(|ev| match ev {
                crate::stream::StreamEvent::Chunk { text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(text, "You said: hello there\n\n[stub reply for llama2]");
    }
}

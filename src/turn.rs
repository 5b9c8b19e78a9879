use crate::conversation::ConversationStore;
use crate::message::Message;
use crate::provider::{ChatRequest, Provider, ProviderError, Reply};
use crate::router::{Classifier, ProviderKind};
use crate::stream::{ByteStream, EventParser, MessageAccumulator, StreamEvent, TransportReader};
use std::future::Future;
use std::sync::Arc;

/// Shown in place of the answer when the connection fails.
pub const TRANSPORT_FAILURE_TEXT: &str = "Sorry, I encountered an error while processing your request.";

pub type SharedProvider = Arc<dyn Provider + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub message: String,
    pub model: String,
    pub provider: ProviderKind,
}

/// How a turn ended. The assistant message is complete in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// The stream ended without a done record.
    ClosedEarly,
    Cancelled,
    Upstream(String),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,
}

/// One chat session: an owned conversation plus the providers it talks to.
pub struct ChatSession {
    store: Arc<ConversationStore>,
    classify: Classifier,
    local: SharedProvider,
    cloud: SharedProvider,
}

impl ChatSession {
    pub fn new(store: Arc<ConversationStore>, classify: Classifier, local: SharedProvider, cloud: SharedProvider) -> Self {
        Self {
            store,
            classify,
            local,
            cloud,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn route(&self, model: &str) -> ProviderKind {
        (self.classify)(model)
    }

    #[cfg(test)]
    pub async fn send(&self, message: &str, model: &str) -> Result<TurnOutcome, TurnError> {
        self.send_until(message, model, std::future::pending()).await
    }

    /// Run one turn for `model`; `cancel` resolving aborts the request.
    pub async fn send_until(
        &self,
        message: &str,
        model: &str,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<TurnOutcome, TurnError> {
        let kind = self.route(model);
        let provider = match kind {
            ProviderKind::Cloud => &self.cloud,
            ProviderKind::Local => &self.local,
        };
        let req = TurnRequest {
            message: message.to_string(),
            model: model.to_string(),
            provider: kind,
        };
        run_turn(&self.store, provider.as_ref(), req, cancel).await
    }
}

/// Run one turn end to end against `provider`.
///
/// Appends the user message and a streaming placeholder, then revises the
/// placeholder in place until it is complete.
pub async fn run_turn(
    store: &ConversationStore,
    provider: &(dyn Provider + Send + Sync),
    req: TurnRequest,
    cancel: impl Future<Output = ()> + Send,
) -> Result<TurnOutcome, TurnError> {
    if req.message.trim().is_empty() {
        return Err(TurnError::EmptyMessage);
    }

    store.append(Message::user(store.next_id(), req.message.clone()));

    let mut acc = MessageAccumulator::new(store.next_id(), req.model.clone());
    store.append(acc.placeholder());

    tracing::debug!(
        id = %acc.id(),
        messages = store.len(),
        model = %req.model,
        provider = provider.name(),
        kind = %req.provider,
        "turn started"
    );

    tokio::pin!(cancel);

    let sent = provider.send(ChatRequest {
        message: req.message.clone(),
        model: req.model.clone(),
    });
    let reply = tokio::select! {
        biased;
        _ = &mut cancel => {
            if let Some(m) = acc.finish_early() {
                store.append(m);
            }
            return Ok(log_outcome(store, &acc, TurnOutcome::Cancelled));
        }
        r = sent => r,
    };

    let outcome = match reply {
        Ok(Reply::Stream(body)) => drive_stream(store, &mut acc, body, cancel).await,
        Ok(Reply::Complete(c)) => {
            let label = c
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("{} {}", req.provider.label(), req.model));
            if let Some(m) = acc.finish_with(c.text, label) {
                store.append(m);
            }
            TurnOutcome::Completed
        }
        Err(ProviderError::Upstream(e)) => {
            tracing::warn!(error = %e, status = ?e.status, "upstream rejected request");
            store.append(acc.fail(e.message.clone()));
            TurnOutcome::Upstream(e.message)
        }
        Err(ProviderError::Transport(e)) => {
            tracing::warn!(error = %e, "request failed");
            store.append(acc.fail(TRANSPORT_FAILURE_TEXT));
            TurnOutcome::Failed(e.to_string())
        }
    };

    Ok(log_outcome(store, &acc, outcome))
}

/// Feed a streamed body through the parser into the store.
///
/// Returns once the message is complete; the body is dropped (and the
/// connection closed) on return.
pub async fn drive_stream(
    store: &ConversationStore,
    acc: &mut MessageAccumulator,
    body: ByteStream,
    cancel: impl Future<Output = ()>,
) -> TurnOutcome {
    let mut events = EventParser::new(TransportReader::new(body));
    tokio::pin!(cancel);

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = &mut cancel => {
                if let Some(m) = acc.finish_early() {
                    store.append(m);
                }
                break TurnOutcome::Cancelled;
            }
            ev = events.next_event() => ev,
        };

        match next {
            Ok(Some(ev)) => {
                let upstream = match &ev {
                    StreamEvent::Error { message } => Some(message.clone()),
                    _ => None,
                };
                if let Some(m) = acc.apply(ev) {
                    store.append(m);
                }
                if acc.is_closed() {
                    break match upstream {
                        Some(message) => TurnOutcome::Upstream(message),
                        None => TurnOutcome::Completed,
                    };
                }
            }
            Ok(None) => {
                if let Some(m) = acc.finish_early() {
                    store.append(m);
                }
                break TurnOutcome::ClosedEarly;
            }
            Err(e) => {
                tracing::warn!(error = %e, received = acc.text().len(), "stream failed");
                store.append(acc.fail(TRANSPORT_FAILURE_TEXT));
                break TurnOutcome::Failed(e.to_string());
            }
        }
    };

    let skipped = events.malformed_count();
    if skipped > 0 {
        tracing::warn!(id = %acc.id(), skipped, "malformed stream records skipped");
    }
    outcome
}

fn log_outcome(store: &ConversationStore, acc: &MessageAccumulator, outcome: TurnOutcome) -> TurnOutcome {
    let label = store.get(acc.id()).map(|m| m.model_label).unwrap_or_default();
    tracing::info!(id = %acc.id(), chars = acc.text().chars().count(), %label, ?outcome, "turn finished");
    outcome
}

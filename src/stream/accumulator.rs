use super::event::StreamEvent;
use crate::message::{Message, MessageId};

pub const ERROR_LABEL: &str = "Error";

/// Folds stream events for one turn into message snapshots.
///
/// Every accepted event yields the snapshot to publish. Once a terminal
/// snapshot has been produced the accumulator is closed and further events
/// yield nothing.
#[derive(Debug)]
pub struct MessageAccumulator {
    id: MessageId,
    model: String,
    buffer: String,
    closed: bool,
}

impl MessageAccumulator {
    pub fn new(id: MessageId, model: impl Into<String>) -> Self {
        Self {
            id,
            model: model.into(),
            buffer: String::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Label shown while output is still arriving.
    pub fn streaming_label(&self) -> String {
        format!("Streaming {}", self.model)
    }

    /// Empty in-progress message reserving the slot for this turn.
    pub fn placeholder(&self) -> Message {
        Message::ai(self.id, "", self.streaming_label(), true)
    }

    pub fn apply(&mut self, event: StreamEvent) -> Option<Message> {
        if self.closed {
            tracing::debug!(id = %self.id, ?event, "event after completion dropped");
            return None;
        }

        match event {
            StreamEvent::Chunk { text } => {
                self.buffer.push_str(&text);
                Some(Message::ai(self.id, self.buffer.clone(), self.streaming_label(), true))
            }
            StreamEvent::Done { model } => {
                let label = model.unwrap_or_else(|| self.model.clone());
                Some(self.close(self.buffer.clone(), label))
            }
            StreamEvent::Error { message } => Some(self.fail(message)),
            StreamEvent::Malformed => None,
        }
    }

    /// The stream ended without a done record: keep what arrived.
    pub fn finish_early(&mut self) -> Option<Message> {
        if self.closed {
            return None;
        }
        let label = self.model.clone();
        Some(self.close(self.buffer.clone(), label))
    }

    /// Complete in one step with an answer that was not streamed.
    pub fn finish_with(&mut self, text: impl Into<String>, label: impl Into<String>) -> Option<Message> {
        if self.closed {
            return None;
        }
        self.buffer = text.into();
        Some(self.close(self.buffer.clone(), label.into()))
    }

    /// Replace the text with `message` and mark the turn failed.
    pub fn fail(&mut self, message: impl Into<String>) -> Message {
        self.close(message.into(), ERROR_LABEL.to_string())
    }

    fn close(&mut self, text: String, label: String) -> Message {
        self.closed = true;
        Message::ai(self.id, text, label, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(t: &str) -> StreamEvent {
        StreamEvent::Chunk { text: t.to_string() }
    }

    #[test]
    fn chunks_produce_growing_snapshots() {
        let mut acc = MessageAccumulator::new(MessageId(2), "llama2");
        let a = acc.apply(chunk("Hi")).unwrap();
        let b = acc.apply(chunk(" there")).unwrap();

        assert_eq!(a.text, "Hi");
        assert_eq!(b.text, "Hi there");
        assert!(b.streaming);
        assert_eq!(b.model_label, "Streaming llama2");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn done_uses_event_model_then_fallback() {
        let mut acc = MessageAccumulator::new(MessageId(1), "llama2");
        acc.apply(chunk("x"));
        let done = acc.apply(StreamEvent::Done { model: Some("llama2:7b".into()) }).unwrap();
        assert_eq!(done.model_label, "llama2:7b");
        assert!(!done.streaming);

        let mut acc = MessageAccumulator::new(MessageId(2), "qwen3:32b");
        let done = acc.apply(StreamEvent::Done { model: None }).unwrap();
        assert_eq!(done.model_label, "qwen3:32b");
        assert_eq!(done.text, "");
    }

    #[test]
    fn nothing_is_processed_after_done() {
        let mut acc = MessageAccumulator::new(MessageId(1), "m");
        acc.apply(StreamEvent::Done { model: None });
        assert!(acc.is_closed());
        assert!(acc.apply(chunk("late")).is_none());
        assert!(acc.finish_early().is_none());
    }

    #[test]
    fn early_close_keeps_accumulated_text() {
        let mut acc = MessageAccumulator::new(MessageId(1), "llama2");
        acc.apply(chunk("He"));
        acc.apply(chunk("llo"));
        let last = acc.finish_early().unwrap();
        assert_eq!(last.text, "Hello");
        assert!(!last.streaming);
        assert_eq!(last.model_label, "llama2");
    }

    #[test]
    fn upstream_error_replaces_text() {
        let mut acc = MessageAccumulator::new(MessageId(1), "m");
        acc.apply(chunk("partial"));
        let msg = acc.apply(StreamEvent::Error { message: "model not found".into() }).unwrap();
        assert_eq!(msg.text, "model not found");
        assert_eq!(msg.model_label, ERROR_LABEL);
        assert!(!msg.streaming);
    }

    #[test]
    fn placeholder_is_empty_and_streaming() {
        let acc = MessageAccumulator::new(MessageId(9), "gemma2-9b-it");
        let p = acc.placeholder();
        assert_eq!(p.text, "");
        assert!(p.streaming);
        assert_eq!(p.model_label, "Streaming gemma2-9b-it");
    }
}

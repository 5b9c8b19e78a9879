use super::transport::{TransportError, TransportReader};
use serde_json::Value;
use std::collections::VecDeque;

const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk { text: String },
    Done { model: Option<String> },
    /// Well-formed error record from the upstream provider.
    Error { message: String },
    Malformed,
}

/// Splits decoded text on `\n`, carrying incomplete fragments between pushes.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buf.push_str(text);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let mut line: String = self.buf.drain(..=pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            out.push(line);
        }
        out
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let line = rest.strip_suffix('\r').unwrap_or(&rest);
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Interpret one protocol line.
///
/// Lines without the `data: ` prefix yield nothing. A record may carry both
/// a chunk and a done flag, in which case the chunk comes first.
pub fn parse_line(line: &str) -> Vec<StreamEvent> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Vec::new();
    };

    let record: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, line = payload, "malformed stream record");
            return vec![StreamEvent::Malformed];
        }
    };
    let Some(obj) = record.as_object() else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(err) = obj.get("error").and_then(error_message) {
        events.push(StreamEvent::Error { message: err });
        return events;
    }

    if let Some(text) = obj.get("chunk").and_then(Value::as_str) {
        if !text.is_empty() {
            events.push(StreamEvent::Chunk { text: text.to_string() });
        }
    }

    if obj.get("done").is_some_and(is_truthy) {
        let model = obj
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        events.push(StreamEvent::Done { model });
    }

    events
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `"error": "text"` or `"error": {"message": "text"}`.
pub(crate) fn error_message(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Turns a [`TransportReader`] into a sequence of [`StreamEvent`]s.
///
/// Malformed records are counted and skipped; they never end the stream.
pub struct EventParser {
    reader: TransportReader,
    lines: LineSplitter,
    pending: VecDeque<StreamEvent>,
    eof: bool,
    malformed: usize,
}

impl EventParser {
    pub fn new(reader: TransportReader) -> Self {
        Self {
            reader,
            lines: LineSplitter::new(),
            pending: VecDeque::new(),
            eof: false,
            malformed: 0,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, TransportError> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Ok(Some(ev));
            }
            if self.eof {
                return Ok(None);
            }

            match self.reader.next_text().await? {
                Some(text) => {
                    for line in self.lines.push(&text) {
                        self.queue(&line);
                    }
                }
                None => {
                    self.eof = true;
                    if let Some(tail) = self.lines.finish() {
                        self.queue(&tail);
                    }
                }
            }
        }
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    fn queue(&mut self, line: &str) {
        for ev in parse_line(line) {
            if ev == StreamEvent::Malformed {
                self.malformed += 1;
                continue;
            }
            tracing::trace!(?ev, "stream event");
            self.pending.push_back(ev);
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one conversational message.
///
/// Stable across revisions: every streamed snapshot of the same answer
/// carries the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    #[serde(rename = "AI")]
    Ai,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "User",
            Sender::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub model_label: String,
    pub timestamp: DateTime<Utc>,
    pub streaming: bool,
}

impl Message {
    pub const HUMAN_LABEL: &'static str = "Human";

    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::User,
            text: text.into(),
            model_label: Self::HUMAN_LABEL.to_string(),
            timestamp: Utc::now(),
            streaming: false,
        }
    }

    /// Snapshot of an assistant answer.
    pub fn ai(id: MessageId, text: impl Into<String>, model_label: impl Into<String>, streaming: bool) -> Self {
        Self {
            id,
            sender: Sender::Ai,
            text: text.into(),
            model_label: model_label.into(),
            timestamp: Utc::now(),
            streaming,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.streaming
    }

    /// Equality ignoring the timestamp, used to detect replayed snapshots.
    pub fn same_content(&self, other: &Message) -> bool {
        self.id == other.id
            && self.sender == other.sender
            && self.text == other.text
            && self.model_label == other.model_label
            && self.streaming == other.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_names() {
        let m = Message::ai(MessageId(7), "hi", "llama2", true);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["sender"], "AI");
        assert_eq!(v["modelLabel"], "llama2");
        assert_eq!(v["streaming"], true);
    }

    #[test]
    fn user_messages_are_complete() {
        let m = Message::user(MessageId(1), "Hi");
        assert!(m.is_complete());
        assert_eq!(m.model_label, "Human");
        assert_eq!(m.sender.as_str(), "User");
    }
}

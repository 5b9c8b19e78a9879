//! Incremental decoding of streamed chat responses.
//!
//! Bytes flow through [`TransportReader`] (UTF-8 text), [`EventParser`]
//! (`data: <json>` lines) and [`MessageAccumulator`] (message snapshots).

mod accumulator;
mod event;
mod transport;

pub use accumulator::MessageAccumulator;
pub(crate) use event::error_message;
pub use event::{EventParser, StreamEvent};
pub use transport::{ByteStream, TransportError, TransportReader};

#[cfg(test)]
pub(crate) use event::parse_line;

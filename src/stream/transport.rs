use bytes::Bytes;
use futures_core::stream::BoxStream;
use tokio_stream::StreamExt;

/// Raw response body as delivered by a provider.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("connection aborted mid-stream: {0}")]
    Aborted(String),
    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() || e.is_request() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Aborted(e.to_string())
        }
    }
}

/// Incremental UTF-8 decoder.
///
/// Holds back an incomplete trailing code point until the next call so
/// multi-byte characters split across reads decode intact. Invalid
/// sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(n) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[n..];
                        }
                        None => {
                            // Truncated sequence at the end; wait for more bytes.
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let keep = rest.len();
        let drop_to = self.pending.len() - keep;
        self.pending.drain(..drop_to);
        out
    }

    /// Flush at end of stream; a dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }
}

/// Pulls byte chunks from a response body and yields decoded text.
pub struct TransportReader {
    inner: ByteStream,
    decoder: Utf8Decoder,
    finished: bool,
}

impl TransportReader {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            decoder: Utf8Decoder::new(),
            finished: false,
        }
    }

    /// Next non-empty piece of text.
    ///
    /// `Ok(None)` is a clean end of stream; an abort surfaces as `Err` and
    /// the reader is finished afterwards.
    pub async fn next_text(&mut self) -> Result<Option<String>, TransportError> {
        while !self.finished {
            match self.inner.next().await {
                Some(Ok(bytes)) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    let text = self.decoder.decode(&bytes);
                    if !text.is_empty() {
                        return Ok(Some(text));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => {
                    self.finished = true;
                    let tail = self.decoder.finish();
                    if !tail.is_empty() {
                        return Ok(Some(tail));
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(chunks: Vec<Result<&'static str, TransportError>>) -> TransportReader {
        let items: Vec<Result<Bytes, TransportError>> = chunks
            .into_iter()
            .map(|c| c.map(|s| Bytes::from_static(s.as_bytes())))
            .collect();
        TransportReader::new(Box::pin(tokio_stream::iter(items)))
    }

    #[test]
    fn decoder_joins_split_code_points() {
        let bytes = "héllo €".as_bytes();
        let euro_start = bytes.len() - 3;
        let mut d = Utf8Decoder::new();

        let mut out = d.decode(&bytes[..2]);
        out.push_str(&d.decode(&bytes[2..euro_start + 1]));
        out.push_str(&d.decode(&bytes[euro_start + 1..]));
        out.push_str(&d.finish());

        assert_eq!(out, "héllo €");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn decoder_flushes_dangling_prefix() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.decode(b"ok\xe2\x82"), "ok");
        assert_eq!(d.finish(), "\u{FFFD}");
        assert_eq!(d.finish(), "");
    }

    #[tokio::test]
    async fn reader_skips_empty_reads() {
        let mut r = reader(vec![Ok(""), Ok("data"), Ok(""), Ok(": x")]);
        assert_eq!(r.next_text().await.unwrap().as_deref(), Some("data"));
        assert_eq!(r.next_text().await.unwrap().as_deref(), Some(": x"));
        assert_eq!(r.next_text().await.unwrap(), None);
        assert_eq!(r.next_text().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reader_surfaces_abort() {
        let mut r = reader(vec![
            Ok("partial"),
            Err(TransportError::Aborted("reset by peer".into())),
            Ok("never"),
        ]);
        assert_eq!(r.next_text().await.unwrap().as_deref(), Some("partial"));
        assert!(matches!(r.next_text().await, Err(TransportError::Aborted(_))));
        assert_eq!(r.next_text().await.unwrap(), None);
    }
}

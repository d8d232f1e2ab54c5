//! Server-sent-events plumbing shared by streaming adapters.
//!
//! An adapter hands [`event_stream`] the HTTP response plus a closure that
//! turns each `data:` payload into stream events; buffering, flushing, and
//! the fallback terminal event are handled here.

use fiscus_domain::error::{Error, Result};
use fiscus_domain::stream::{BoxStream, StreamEvent};

/// Incremental SSE frame buffer. Feed it raw bytes; take complete `data:`
/// payloads out. Partial frames stay buffered until their terminator
/// arrives.
#[derive(Default)]
pub struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return every completed `data:` payload.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        self.take_complete()
    }

    /// Force-flush whatever remains (stream closed without a final
    /// terminator).
    pub fn finish(&mut self) -> Vec<String> {
        if self.pending.trim().is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        self.pending.push_str("\n\n");
        self.take_complete()
    }

    fn take_complete(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.find("\n\n") {
            let frame: String = self.pending.drain(..pos + 2).collect();
            for line in frame.lines() {
                if let Some(data) = line.trim().strip_prefix("data:") {
                    let data = data.trim();
                    if !data.is_empty() {
                        payloads.push(data.to_owned());
                    }
                }
            }
        }
        payloads
    }
}

/// Build a [`BoxStream`] of events from an SSE `reqwest::Response`.
///
/// The parser closure is `FnMut` so adapters can keep assembly state
/// (e.g. partial tool-call arguments) across payloads. A terminal `Done`
/// is synthesized if the parser never produced one.
pub fn event_stream<F>(
    response: reqwest::Response,
    mut parse: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = SseBuffer::new();
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for payload in buffer.feed(&bytes) {
                        for event in parse(&payload) {
                            if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    for payload in buffer.finish() {
                        for event in parse(&payload) {
                            if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(Error::Http(e.to_string()));
                    break;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame() {
        let mut buf = SseBuffer::new();
        let payloads = buf.feed(b"event: message\ndata: {\"a\":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[test]
    fn partial_frame_waits_for_terminator() {
        let mut buf = SseBuffer::new();
        assert!(buf.feed(b"data: first half").is_empty());
        let payloads = buf.feed(b" second half\n\n");
        assert_eq!(payloads, vec!["first half second half"]);
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut buf = SseBuffer::new();
        let payloads = buf.feed(b"data: one\n\ndata: two\n\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut buf = SseBuffer::new();
        let payloads = buf.feed(b"event: ping\nid: 7\nretry: 100\ndata: kept\n\n");
        assert_eq!(payloads, vec!["kept"]);
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut buf = SseBuffer::new();
        assert!(buf.feed(b"data: tail").is_empty());
        assert_eq!(buf.finish(), vec!["tail"]);
    }

    #[test]
    fn finish_on_empty_buffer_is_empty() {
        let mut buf = SseBuffer::new();
        assert!(buf.finish().is_empty());
    }

    #[test]
    fn empty_data_payloads_are_dropped() {
        let mut buf = SseBuffer::new();
        assert!(buf.feed(b"data: \n\n").is_empty());
    }
}

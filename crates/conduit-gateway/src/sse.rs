//! Incremental Server-Sent Events parser
//!
//! Turns arbitrary byte chunks from an upstream response into ordered
//! [`SseEvent`]s. The output does not depend on how the input was split.

use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use serde_json::Value;

/// Payload of one event
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    /// Parsed JSON payload
    Json(Value),
    /// The `[DONE]` sentinel
    Done,
}

/// One dispatched event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event_type: Option<String>,
    pub data: SseData,
}

impl SseEvent {
    /// JSON payload, `None` for `[DONE]`
    pub const fn json(&self) -> Option<&Value> {
        match &self.data {
            SseData::Json(value) => Some(value),
            SseData::Done => None,
        }
    }
}

/// Stateful line-oriented parser
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
    warnings: usize,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one line without its terminator
    ///
    /// Returns an event when `line` is blank and completes one.
    pub fn add_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            _ => {}
        }

        None
    }

    /// Dispatch whatever is accumulated, used at end of input
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            if let Some(event) = self.add_line(&String::from_utf8_lossy(&tail)) {
                return Some(event);
            }
        }

        self.dispatch()
    }

    /// Feed raw bytes, returning every event they complete
    ///
    /// Incomplete lines are buffered as bytes so a UTF-8 sequence split
    /// across chunks is decoded only once whole.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if let Some(event) = self.add_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Number of events discarded because their data was not JSON
    pub const fn parse_warnings(&self) -> usize {
        self.warnings
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        if data.trim() == "[DONE]" {
            return Some(SseEvent {
                event_type,
                data: SseData::Done,
            });
        }

        match serde_json::from_str(&data) {
            Ok(value) => Some(SseEvent {
                event_type,
                data: SseData::Json(value),
            }),
            Err(e) => {
                self.warnings += 1;
                tracing::warn!(error = %e, event_type = ?event_type, "discarding non-JSON SSE event");
                None
            }
        }
    }
}

/// Adapt a byte stream into a lazily parsed event stream
///
/// Stream errors are passed through and end the event stream.
pub fn sse_stream<S, E>(bytes: S) -> impl Stream<Item = Result<SseEvent, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
    E: Send,
{
    struct State<S> {
        bytes: S,
        parser: SseParser,
        ready: VecDeque<SseEvent>,
        finished: bool,
    }

    let state = State {
        bytes,
        parser: SseParser::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.parser.feed(&chunk)),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.parser.flush());
                }
            }
        }
    })
}

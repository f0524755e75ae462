use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, trace};

use super::error::{StreamError, TransportError};

/// One decoded push-event record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    pub event_name: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Line-level parser for the push-event text format.
///
/// Feed it one line at a time (without the line terminator); a blank line
/// completes the current record.
#[derive(Debug, Default)]
pub struct EventParser {
    event_name: Option<String>,
    data: Option<String>,
    id: Option<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one line. Returns a record when `line` is blank and something
    /// was accumulated since the previous record.
    pub fn push_line(&mut self, line: &str) -> Option<Event> {
        if line.is_empty() {
            return self.take_event();
        }

        // Comment line
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => match self.data {
                Some(ref mut data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" => self.id = Some(value.to_string()),
            other => trace!(field = other, "Ignoring unrecognized field"),
        }
        None
    }

    /// True if fields have been accumulated without a terminating blank line.
    pub fn has_pending(&self) -> bool {
        self.event_name.is_some() || self.data.is_some() || self.id.is_some()
    }

    fn take_event(&mut self) -> Option<Event> {
        if !self.has_pending() {
            return None;
        }
        Some(Event {
            event_name: self.event_name.take(),
            data: self.data.take().unwrap_or_default(),
            id: self.id.take(),
        })
    }
}

/// Pulls chunks from the source and splits them into lines.
struct ChunkDecoder<S> {
    source: Pin<Box<S>>,
    buffer: Vec<u8>,
    /// Length of the buffer prefix already searched for a newline.
    scanned: usize,
    parser: EventParser,
    ready: VecDeque<Event>,
    finished: bool,
}

impl<S, B, E> ChunkDecoder<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<TransportError>,
{
    fn new(source: S) -> Self {
        Self {
            source: Box::pin(source),
            buffer: Vec::new(),
            scanned: 0,
            parser: EventParser::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    async fn next_event(&mut self) -> Result<Option<Event>, StreamError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            match self.source.next().await {
                Some(Ok(chunk)) => self.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(StreamError::transport(e));
                }
                None => {
                    self.finished = true;
                    if !self.buffer.is_empty() || self.parser.has_pending() {
                        debug!(
                            buffered_bytes = self.buffer.len(),
                            "Stream closed mid-record, discarding incomplete event"
                        );
                    }
                }
            }
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = &self.buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let text = String::from_utf8_lossy(line);
            if let Some(event) = self.parser.push_line(&text) {
                self.ready.push_back(event);
            }
            start = end + 1;
            self.scanned = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
    }
}

/// Decode a byte stream into push-event records.
///
/// The returned stream is lazy and ends when the source closes. A transport
/// error is yielded once and ends the stream. A record not terminated by a
/// blank line before the source closes is dropped.
pub fn decode<S, B, E>(source: S) -> impl Stream<Item = Result<Event, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<TransportError>,
{
    stream::unfold(Some(ChunkDecoder::new(source)), |state| async move {
        let mut decoder = state?;
        match decoder.next_event().await {
            Ok(Some(event)) => Some((Ok(event), Some(decoder))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

// Chunked-response channel.
//
// Wraps one streaming HTTP response and yields parsed events as the body
// arrives. Used for long-running operations that report progress over
// `text/event-stream`; never reconnects.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::Error;
use crate::sse::{EventStreamParser, StreamEvent};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Event-by-event reader over a streaming response body.
pub struct EventStream {
    body: ByteStream,
    parser: EventStreamParser,
    ready: std::collections::VecDeque<StreamEvent>,
    bytes_received: u64,
    finished: bool,
}

impl EventStream {
    /// Take ownership of an already-successful response.
    pub fn new(response: reqwest::Response) -> Self {
        Self::from_byte_stream(response.bytes_stream())
    }

    pub(crate) fn from_byte_stream(
        stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            body: Box::pin(stream),
            parser: EventStreamParser::new(),
            ready: std::collections::VecDeque::new(),
            bytes_received: 0,
            finished: false,
        }
    }

    /// Next complete event, or `Ok(None)` once the body is drained.
    ///
    /// A body read failure is reported as [`Error::StreamInterrupted`].
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, Error> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.bytes_received += chunk.len() as u64;
                    tracing::trace!(len = chunk.len(), "event stream chunk");
                    self.ready.extend(self.parser.parse_bytes(&chunk));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(Error::StreamInterrupted(e.to_string()));
                }
                None => {
                    self.finished = true;
                    // A final event without its blank terminator line is incomplete.
                    if self.parser.has_pending() {
                        tracing::debug!("event stream ended mid-event");
                    }
                }
            }
        }
    }

    /// `true` once at least one body byte has arrived.
    pub fn has_received_data(&self) -> bool {
        self.bytes_received > 0
    }

    /// Adapt into a `Stream` of events. The stream ends after the first error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<StreamEvent, Error>> + Send {
        async_stream::stream! {
            loop {
                match self.next_event().await {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }
}

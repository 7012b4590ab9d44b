//! Accumulates line fragments until they form one JSON value.
//!
//! State machine:
//! - `Empty --fragment--> Empty` when the fragment parses on its own.
//! - `Empty|Pending --fragment--> Pending` when the parser runs out of input.
//! - `Pending --fragment--> Empty` when the concatenation parses.
//! - a genuine syntax error clears the buffer and reports `Malformed`, except
//!   that a stale pending prefix followed by a fragment that opens a new object
//!   is dropped and the fragment retried alone.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    /// A full value was parsed; the buffer is empty again.
    Complete(Value),
    /// More input is needed; the buffer keeps its contents.
    Incomplete,
    /// The buffered text can never become valid JSON and was discarded.
    Malformed { reason: String, discarded: usize },
}

enum Parse {
    Value(Value),
    NeedMore,
    Invalid(serde_json::Error),
}

fn try_parse(text: &str) -> Parse {
    match serde_json::from_str::<Value>(text) {
        Ok(v) => Parse::Value(v),
        Err(e) if e.is_eof() => Parse::NeedMore,
        Err(e) => Parse::Invalid(e),
    }
}

#[derive(Debug)]
pub struct JsonBuffer {
    buf: String,
    max_pending: usize,
}

impl JsonBuffer {
    pub fn new(max_pending: usize) -> Self {
        Self {
            buf: String::new(),
            max_pending,
        }
    }

    pub fn state(&self) -> BufferState {
        if self.buf.is_empty() {
            BufferState::Empty
        } else {
            BufferState::Pending
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn pending(&self) -> &str {
        &self.buf
    }

    pub fn feed(&mut self, fragment: &str) -> FeedOutcome {
        let had_prefix = !self.buf.is_empty();
        self.buf.push_str(fragment);

        match try_parse(&self.buf) {
            Parse::Value(v) => {
                self.buf.clear();
                FeedOutcome::Complete(v)
            }
            Parse::NeedMore if self.buf.len() > self.max_pending => {
                let discarded = self.take_all();
                FeedOutcome::Malformed {
                    reason: format!("event exceeded {} bytes without completing", self.max_pending),
                    discarded,
                }
            }
            Parse::NeedMore => FeedOutcome::Incomplete,
            Parse::Invalid(err) => {
                if had_prefix && fragment.trim_start().starts_with('{') {
                    let stale = self.buf.len() - fragment.len();
                    tracing::warn!(discarded = stale, error = %err, "dropping unfinished event, resynchronising");
                    self.buf.clear();
                    return self.feed(fragment);
                }
                let discarded = self.take_all();
                FeedOutcome::Malformed {
                    reason: err.to_string(),
                    discarded,
                }
            }
        }
    }

    /// End of stream: an unfinished event is reported and dropped.
    pub fn finish(&mut self) -> Option<FeedOutcome> {
        if self.buf.is_empty() {
            return None;
        }
        let discarded = self.take_all();
        Some(FeedOutcome::Malformed {
            reason: "stream ended inside an event".into(),
            discarded,
        })
    }

    /// Drop whatever is pending; returns the number of bytes dropped.
    pub fn discard(&mut self) -> usize {
        self.take_all()
    }

    fn take_all(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }
}

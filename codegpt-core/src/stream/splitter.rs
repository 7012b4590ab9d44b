//! Splits decoded text into protocol lines.
//!
//! The text after the last `\n` of a read is held until the newline arrives
//! (or the stream ends), so lines are only trimmed at real line boundaries.
//! Held text is capped: a line that outgrows the cap is dropped up to its
//! newline.

/// Literal line that ends the event stream.
pub const DONE_SENTINEL: &str = "data: [DONE]";
/// Event marker stripped from payload lines.
pub const DATA_PREFIX: &str = "data:";

const DONE_PAYLOAD: &str = "[DONE]";
const IGNORED_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// JSON text (possibly a fragment of one event).
    Payload(String),
    /// The end-of-stream sentinel.
    Done,
}

/// What `push` hands back, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// One raw line without its `\n`, not yet classified.
    Line(String),
    /// Held text passed the cap without a newline and was dropped.
    Overflow { discarded: usize },
}

#[derive(Debug)]
pub struct LineSplitter {
    tail: String,
    max_len: usize,
    /// Dropping the rest of an overlong line.
    discarding: bool,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::with_max_len(usize::MAX)
    }
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            tail: String::new(),
            max_len,
            discarding: false,
        }
    }

    /// Text received but not yet terminated by a newline.
    pub fn held(&self) -> &str {
        &self.tail
    }

    /// Feed decoded text; returns complete lines in arrival order.
    ///
    /// A held tail that is exactly the sentinel is released without waiting
    /// for its newline.
    pub fn push(&mut self, text: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut text = text;
        if self.discarding {
            match text.find('\n') {
                Some(i) => {
                    tracing::trace!(discarded = i, "end of overlong line");
                    self.discarding = false;
                    text = &text[i + 1..];
                }
                None => return out,
            }
        }

        self.tail.push_str(text);
        let mut start = 0;
        while let Some(rel) = self.tail[start..].find('\n') {
            let end = start + rel;
            out.push(Segment::Line(self.tail[start..end].to_string()));
            start = end + 1;
        }
        self.tail.drain(..start);

        if self.tail.len() > self.max_len {
            let discarded = self.tail.len();
            self.tail.clear();
            self.discarding = true;
            out.push(Segment::Overflow { discarded });
        } else if is_sentinel(&self.tail) {
            out.push(Segment::Line(std::mem::take(&mut self.tail)));
        }
        out
    }

    /// End of stream: the held tail, if any, is returned as a last line.
    pub fn finish(&mut self) -> Option<String> {
        self.discarding = false;
        let rest = std::mem::take(&mut self.tail);
        (!rest.is_empty()).then_some(rest)
    }
}

fn is_sentinel(raw: &str) -> bool {
    let line = raw.trim();
    line == DONE_SENTINEL
        || line
            .strip_prefix(DATA_PREFIX)
            .is_some_and(|rest| rest.trim_start() == DONE_PAYLOAD)
}

/// Classify one raw line. Blank lines and empty `data:` fields yield `None`.
///
/// SSE comments and non-data fields are dropped only between events; while
/// an event is `pending` they are continuation text like any other line.
pub fn classify(raw: &str, pending: bool) -> Option<Line> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    if is_sentinel(line) {
        return Some(Line::Done);
    }
    if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
        let payload = rest.strip_prefix(' ').unwrap_or(rest);
        if payload.is_empty() {
            return None;
        }
        return Some(Line::Payload(payload.to_string()));
    }
    if !pending && (line.starts_with(':') || IGNORED_FIELDS.iter().any(|f| line.starts_with(f))) {
        return None;
    }
    // continuation of an event split over several physical lines
    Some(Line::Payload(line.to_string()))
}

use crate::model::StopReason;

use super::decoder::ChunkDecoder;
use super::delta::{Extracted, extract};
use super::json_buffer::{BufferState, FeedOutcome, JsonBuffer};
use super::splitter::{Line, LineSplitter, Segment, classify};
use super::StreamNotice;

/// Turns raw network reads into the cumulative answer text.
///
/// Synchronous and single-owner: the session feeds it one read at a time.
#[derive(Debug)]
pub struct Assembler {
    decoder: ChunkDecoder,
    splitter: LineSplitter,
    buffer: JsonBuffer,
    output: String,
    events: u64,
    finish_reason: Option<String>,
    terminal: bool,
}

impl Assembler {
    /// `max_pending_bytes` caps both an unterminated line and an unfinished event.
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            decoder: ChunkDecoder::new(),
            splitter: LineSplitter::with_max_len(max_pending_bytes),
            buffer: JsonBuffer::new(max_pending_bytes),
            output: String::new(),
            events: 0,
            finish_reason: None,
            terminal: false,
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    /// Number of events that parsed as chat chunks.
    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn finish_reason(&self) -> Option<StopReason> {
        self.finish_reason.as_deref().map(StopReason::from_wire)
    }

    /// Bytes held waiting for a newline or for the rest of an event.
    pub fn held_bytes(&self) -> usize {
        self.splitter.held().len() + self.buffer.pending().len()
    }

    /// True after the sentinel or `finish`.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Process one network read.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<StreamNotice> {
        if self.terminal {
            return Vec::new();
        }
        let text = self.decoder.decode(bytes);
        let segments = self.splitter.push(&text);
        let mut notices = Vec::new();
        self.process(segments, &mut notices);
        notices
    }

    /// The body ended: drain held text and close the session's assembly.
    pub fn finish(&mut self) -> Vec<StreamNotice> {
        let mut notices = Vec::new();
        if !self.terminal {
            let text = self.decoder.finish();
            let mut segments = self.splitter.push(&text);
            segments.extend(self.splitter.finish().map(Segment::Line));
            self.process(segments, &mut notices);
        }
        self.close(&mut notices);
        notices
    }

    fn process(&mut self, segments: Vec<Segment>, notices: &mut Vec<StreamNotice>) {
        for segment in segments {
            if self.terminal {
                return;
            }
            match segment {
                Segment::Line(raw) => {
                    let pending = self.buffer.state() == BufferState::Pending;
                    match classify(&raw, pending) {
                        Some(Line::Done) => {
                            tracing::debug!(events = self.events, "stream sentinel received");
                            self.close(notices);
                        }
                        Some(Line::Payload(fragment)) => self.feed(&fragment, notices),
                        None => {}
                    }
                }
                Segment::Overflow { discarded } => {
                    let discarded = discarded + self.buffer.discard();
                    let reason = format!("line exceeded {} bytes without a newline", self.buffer.max_pending());
                    tracing::warn!(%reason, discarded, "overlong line dropped");
                    notices.push(StreamNotice::Malformed { reason, discarded });
                }
            }
        }
    }

    fn feed(&mut self, fragment: &str, notices: &mut Vec<StreamNotice>) {
        match self.buffer.feed(fragment) {
            FeedOutcome::Complete(value) => match extract(value) {
                Extracted::Delta {
                    delta,
                    finish_reason,
                } => {
                    self.events += 1;
                    delta.apply_to(&mut self.output);
                    if finish_reason.is_some() {
                        self.finish_reason = finish_reason;
                    }
                }
                Extracted::ProviderError(body) => {
                    tracing::warn!(error = %body.message, kind = ?body.kind, "provider error inside stream");
                    notices.push(StreamNotice::ProviderError {
                        code: body.kind,
                        message: body.message,
                    });
                }
                Extracted::Skipped(why) => {
                    tracing::warn!(reason = %why, "skipping event");
                }
            },
            FeedOutcome::Incomplete => {
                tracing::trace!(pending = self.buffer.pending().len(), "event incomplete, waiting");
            }
            FeedOutcome::Malformed { reason, discarded } => {
                tracing::warn!(%reason, discarded, "malformed event dropped");
                notices.push(StreamNotice::Malformed { reason, discarded });
            }
        }
    }

    fn close(&mut self, notices: &mut Vec<StreamNotice>) {
        if let Some(FeedOutcome::Malformed { reason, discarded }) = self.buffer.finish() {
            tracing::warn!(%reason, discarded, "unfinished event dropped");
            notices.push(StreamNotice::Malformed { reason, discarded });
        }
        self.terminal = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices":[{"delta":{"content":content}}]})
        )
    }

    fn run(chunks: &[&str]) -> (Assembler, Vec<StreamNotice>) {
        let bytes: Vec<&[u8]> = chunks.iter().map(|c| c.as_bytes()).collect();
        run_bytes(&bytes)
    }

    fn run_bytes(chunks: &[&[u8]]) -> (Assembler, Vec<StreamNotice>) {
        let mut a = Assembler::new(1 << 20);
        let mut notices = Vec::new();
        for c in chunks {
            notices.extend(a.push_bytes(c));
        }
        notices.extend(a.finish());
        (a, notices)
    }

    #[test]
    fn split_event_across_reads() {
        let (a, notices) = run(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
            "lo\"}}]}\n",
            "data: [DONE]\n",
        ]);
        assert_eq!(a.output(), "Hello");
        assert!(a.is_terminal());
        assert!(notices.is_empty());
        assert_eq!(a.events(), 1);
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let contents = ["Hello", ", ", "wörld", " 🦀", "", "\n```rust\nfn main() {}\n```"];
        let mut body = String::new();
        for c in contents {
            body.push_str(&event(c));
        }
        body.push_str("data: [DONE]\n\n");
        let bytes = body.as_bytes();

        let per_event: Vec<String> = contents.iter().map(|c| event(c)).collect();
        let per_event_refs: Vec<&str> = per_event.iter().map(|s| s.as_str()).collect();
        let (reference, _) = run(&per_event_refs);
        let expected = reference.output().to_string();
        assert_eq!(expected, "Hello, wörld 🦀\n\n```rust\nfn main() {}\n```");

        for size in 1..=17 {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let (a, notices) = run_bytes(&chunks);
            assert_eq!(a.output(), expected, "chunk size {size}");
            assert!(notices.is_empty(), "chunk size {size}: {notices:?}");
        }
    }

    #[test]
    fn event_split_over_physical_lines() {
        let (a, notices) = run(&[
            "data: {\"choices\":[{\"delta\":\n",
            "{\"content\":\"multi\"}}]}\n",
            "data: [DONE]\n",
        ]);
        assert_eq!(a.output(), "multi");
        assert!(notices.is_empty());
    }

    #[test]
    fn colon_led_continuation_line_completes_event() {
        let (a, notices) = run(&[
            "data: {\"choices\":[{\"delta\":{\"content\"\n",
            ":\"X\"}}]}\n",
            "data: [DONE]\n",
        ]);
        assert_eq!(a.output(), "X");
        assert!(notices.is_empty(), "{notices:?}");
    }

    #[test]
    fn keep_alive_comment_between_events_is_ignored() {
        let body = format!("{}: keep-alive\n{}data: [DONE]\n", event("a"), event("b"));
        let (a, notices) = run(&[body.as_str()]);
        assert_eq!(a.output(), "ab");
        assert!(notices.is_empty());
    }

    #[test]
    fn unterminated_line_is_capped() {
        let mut a = Assembler::new(64);
        let mut notices = a.push_bytes(b"data: {\"choices\":[{\"delta\":{\"content\":\"");
        let kib = vec![b'x'; 1024];
        for _ in 0..1000 {
            notices.extend(a.push_bytes(&kib));
            assert!(a.held_bytes() <= 64);
        }
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], StreamNotice::Malformed { reason, .. } if reason.contains("64 bytes")));

        notices.extend(a.push_bytes(format!("\"}}}}]}}\n{}", event("after")).as_bytes()));
        notices.extend(a.finish());
        assert_eq!(a.output(), "after");
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn sentinel_without_trailing_newline_is_terminal() {
        let mut a = Assembler::new(1024);
        assert!(a.push_bytes(event("x").as_bytes()).is_empty());
        assert!(a.push_bytes(b"data: [DONE]").is_empty());
        assert!(a.is_terminal());
        assert_eq!(a.output(), "x");
    }

    #[test]
    fn sentinel_never_reaches_output_and_stops_processing() {
        let body = format!("{}data: [DONE]\n{}", event("a"), event("ignored"));
        let (a, _) = run(&[body.as_str()]);
        assert_eq!(a.output(), "a");
        assert!(!a.output().contains("DONE"));
    }

    #[test]
    fn input_after_terminal_is_ignored() {
        let mut a = Assembler::new(1024);
        a.push_bytes(b"data: [DONE]\n");
        assert!(a.is_terminal());
        assert!(a.push_bytes(event("late").as_bytes()).is_empty());
        assert_eq!(a.output(), "");
    }

    #[test]
    fn malformed_line_then_sentinel() {
        let (a, notices) = run(&["data: {not json\n", "data: [DONE]\n"]);
        assert_eq!(a.output(), "");
        assert!(a.is_terminal());
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], StreamNotice::Malformed { discarded: 9, .. }));
    }

    #[test]
    fn recovers_after_malformed_line() {
        let body = format!("data: {{oops\n{}data: [DONE]\n", event("ok"));
        let (a, notices) = run(&[body.as_str()]);
        assert_eq!(a.output(), "ok");
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn structural_events_insert_newlines_and_record_finish() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n"
        );
        let (a, _) = run(&[body]);
        assert_eq!(a.output(), "\nhi\n");
        assert_eq!(a.finish_reason(), Some(StopReason::Stop));
        assert_eq!(a.events(), 3);
    }

    #[test]
    fn stream_end_without_sentinel_flushes_tail() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let (a, notices) = run(&[body]);
        assert_eq!(a.output(), "tail");
        assert!(notices.is_empty());
        assert!(a.is_terminal());
    }

    #[test]
    fn truncated_event_at_end_is_reported() {
        let (a, notices) = run(&["data: {\"choices\":[{\"delta\":{\"content\":\"cut"]);
        assert_eq!(a.output(), "");
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn provider_error_event_is_a_notice() {
        let (a, notices) = run(&["data: {\"error\":{\"message\":\"overloaded\"}}\n"]);
        assert_eq!(a.output(), "");
        assert_eq!(
            notices,
            vec![StreamNotice::ProviderError {
                code: None,
                message: "overloaded".into()
            }]
        );
    }

    #[test]
    fn usage_only_chunk_adds_nothing() {
        let body = "data: {\"choices\":[],\"usage\":{\"total_tokens\":3}}\ndata: [DONE]\n";
        let (a, notices) = run(&[body]);
        assert_eq!(a.output(), "");
        assert!(notices.is_empty());
        assert_eq!(a.events(), 0);
    }
}

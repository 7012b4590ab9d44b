//! Tracing conventions for streaming sessions.
//!
//! Every session runs inside one `stream_session` span. The identifying fields
//! are set when the span is created; the counters and the final state are
//! recorded once the session ends.

pub mod keys;
#[cfg(test)]
pub mod test_span;

pub use keys::*;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Span;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing session id.
pub fn next_session_id() -> u64 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

/// Span covering one session; field names match `keys`.
pub fn session_span(id: u64, provider: &str, model: &str) -> Span {
    tracing::info_span!(
        "stream_session",
        session.id = id,
        llm.provider = %provider,
        llm.model = %model,
        stream.events = tracing::field::Empty,
        stream.chars = tracing::field::Empty,
        finish.reason = tracing::field::Empty,
        session.state = tracing::field::Empty,
        error.kind = tracing::field::Empty,
    )
}

/// Summary recorded on the session span once the session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary<'a> {
    pub events: u64,
    pub chars: usize,
    pub finish_reason: Option<&'a str>,
    pub state: &'a str,
    pub error_kind: Option<&'a str>,
}

pub fn record_summary(span: &Span, s: &SessionSummary<'_>) {
    span.record(KEY_STREAM_EVENTS, s.events);
    span.record(KEY_STREAM_CHARS, s.chars as u64);
    span.record(KEY_SESSION_STATE, s.state);
    if let Some(r) = s.finish_reason {
        span.record(KEY_FINISH_REASON, r);
    }
    if let Some(k) = s.error_kind {
        span.record(KEY_ERROR_KIND, k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_increase() {
        let a = next_session_id();
        let b = next_session_id();
        assert!(b > a);
    }

    #[test]
    fn span_fields_are_recorded() {
        let (store, _guard) = test_span::install_capture();
        let span = session_span(7, "openai", "gpt-4o");
        record_summary(
            &span,
            &SessionSummary {
                events: 3,
                chars: 5,
                finish_reason: Some("stop"),
                state: "done",
                error_kind: None,
            },
        );
        let data = store.find("stream_session").unwrap();
        let fields = data.fields.lock().unwrap();
        assert_eq!(fields.get(KEY_SESSION_ID).map(String::as_str), Some("7"));
        assert_eq!(fields.get(KEY_MODEL).map(String::as_str), Some("gpt-4o"));
        assert_eq!(fields.get("llm.provider").map(String::as_str), Some("openai"));
        assert_eq!(fields.get(KEY_STREAM_EVENTS).map(String::as_str), Some("3"));
        assert_eq!(fields.get(KEY_STREAM_CHARS).map(String::as_str), Some("5"));
        assert_eq!(fields.get(KEY_FINISH_REASON).map(String::as_str), Some("\"stop\""));
        assert_eq!(fields.get(KEY_SESSION_STATE).map(String::as_str), Some("\"done\""));
        assert!(!fields.contains_key(KEY_ERROR_KIND));
    }
}

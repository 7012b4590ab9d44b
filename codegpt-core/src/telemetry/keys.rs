/// Span/log attribute keys for streaming sessions.
/// Keep these stable; log queries depend on them.
pub const KEY_SESSION_ID: &str = "session.id";
pub const KEY_MODEL: &str = "llm.model";

pub const KEY_STREAM_EVENTS: &str = "stream.events";
pub const KEY_STREAM_CHARS: &str = "stream.chars";
pub const KEY_FINISH_REASON: &str = "finish.reason";
pub const KEY_SESSION_STATE: &str = "session.state";

/// Error-related (if applicable)
pub const KEY_ERROR_KIND: &str = "error.kind";

use serde_json::Value;

use crate::model::{ChatCompletionChunk, StreamErrorBody, StreamErrorEnvelope};

/// Increment contributed by one event to the cumulative output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Text appended verbatim.
    Text(String),
    /// Structural event without content; appends one newline.
    Break,
}

impl Delta {
    pub fn apply_to(&self, out: &mut String) {
        match self {
            Self::Text(t) => out.push_str(t),
            Self::Break => out.push('\n'),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Delta {
        delta: Delta,
        finish_reason: Option<String>,
    },
    /// The provider reported an error inside the stream.
    ProviderError(StreamErrorBody),
    /// Valid JSON that is not a chunk; contributes nothing.
    Skipped(String),
}

/// Read the first choice's `delta.content` out of a parsed event.
pub fn extract(value: Value) -> Extracted {
    if value.get("error").is_some() {
        return match serde_json::from_value::<StreamErrorEnvelope>(value) {
            Ok(env) => Extracted::ProviderError(env.error),
            Err(e) => Extracted::Skipped(format!("unreadable error event: {e}")),
        };
    }

    let chunk = match serde_json::from_value::<ChatCompletionChunk>(value) {
        Ok(c) => c,
        Err(e) => return Extracted::Skipped(format!("unexpected event shape: {e}")),
    };
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Extracted::Skipped("event has no choices".into());
    };

    let delta = match choice.delta.and_then(|d| d.content) {
        Some(text) if !text.is_empty() => Delta::Text(text),
        _ => Delta::Break,
    };
    Extracted::Delta {
        delta,
        finish_reason: choice.finish_reason,
    }
}

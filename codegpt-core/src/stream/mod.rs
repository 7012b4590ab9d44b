//! Streaming response assembly.
//!
//! Contract:
//! - Bytes go through `ChunkDecoder` → `LineSplitter` → `JsonBuffer` → `extract`.
//! - Cumulative output only ever grows within a session.
//! - Once the sentinel is seen the assembler is terminal and ignores further input.
//! - Problems found along the way are reported as `StreamNotice`s; none of them stop the stream.

pub mod assembler;
pub mod decoder;
pub mod delta;
pub mod json_buffer;
pub mod splitter;

pub use assembler::Assembler;
pub use decoder::ChunkDecoder;
pub use delta::{Delta, Extracted, extract};
pub use json_buffer::{BufferState, FeedOutcome, JsonBuffer};
pub use splitter::{DONE_SENTINEL, Line, LineSplitter, Segment};

use crate::error::CodeGptError;

/// Non-fatal problem observed while assembling.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    /// Text that could not be parsed was dropped.
    Malformed { reason: String, discarded: usize },
    /// The provider sent an error object mid-stream.
    ProviderError { code: Option<String>, message: String },
}

impl StreamNotice {
    pub fn message(&self) -> String {
        match self {
            Self::Malformed { reason, discarded } => {
                format!("skipped {discarded} bytes of malformed stream data: {reason}")
            }
            Self::ProviderError { code: Some(code), message } => {
                format!("provider reported an error ({code}): {message}")
            }
            Self::ProviderError { code: None, message } => format!("provider reported an error: {message}"),
        }
    }
}

impl From<StreamNotice> for CodeGptError {
    fn from(n: StreamNotice) -> Self {
        match n {
            StreamNotice::ProviderError { code, message } => CodeGptError::ProviderError {
                provider: "stream".into(),
                code: code.unwrap_or_else(|| "stream_error".into()),
                message,
            },
            malformed => CodeGptError::MalformedEvent(malformed.message()),
        }
    }
}

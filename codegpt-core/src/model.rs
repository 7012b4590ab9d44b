use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, PreconditionError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Other,
}

impl StopReason {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            "tool_calls" | "function_call" => Self::ToolUse,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolUse => "tool_use",
            Self::ContentFilter => "content_filter",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of a streaming chat-completion request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// System prompt followed by the user prompt, always streamed.
    pub fn streaming(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens,
            temperature,
            stream: true,
        }
    }
}

// ---- Streamed wire events ----

/// One `data:` payload of the response stream.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Error object some providers emit in place of a chunk once the stream is open.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StreamErrorEnvelope {
    pub error: StreamErrorBody,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StreamErrorBody {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

// ---- Inbound panel messages ----

/// Message posted by the input panel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum PanelMessage {
    Submit {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl PanelMessage {
    /// Returns the prompt carried by a submit message; blank text is refused.
    /// Non-submit messages yield `Ok(None)`.
    pub fn into_prompt(self) -> CoreResult<Option<String>> {
        match self {
            Self::Submit { text } => match text {
                Some(t) if !t.trim().is_empty() => Ok(Some(t)),
                _ => Err(PreconditionError::EmptyInput.into()),
            },
            Self::Unknown => Ok(None),
        }
    }
}

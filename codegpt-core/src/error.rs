use thiserror::Error;

/// Reasons an operation is refused before any network I/O happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("API key not found in environment variable {env}")]
    MissingCredential { env: String },

    #[error("input was empty")]
    EmptyInput,

    #[error("no workspace folder is open: {0}")]
    NoWorkspace(String),
}

/// Core error type for codegpt.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum CodeGptError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("upstream error from {provider}: {code} {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("no data received for {idle_ms}ms")]
    IdleTimeout { idle_ms: u64 },

    #[error("malformed stream event: {0}")]
    MalformedEvent(String),

    #[error("response could not be saved to {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CodeGptError {
    /// Short stable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Config(_) => "config",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderUnavailable { .. } => "unavailable",
            Self::ProviderError { .. } => "provider_error",
            Self::IdleTimeout { .. } => "idle_timeout",
            Self::MalformedEvent(_) => "malformed_event",
            Self::Persistence { .. } => "persistence",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CodeGptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_converts_and_displays() {
        let err: CodeGptError = PreconditionError::MissingCredential {
            env: "OPENAI_API_KEY".into(),
        }
        .into();
        assert_eq!(err.kind(), "precondition");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}

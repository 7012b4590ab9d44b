pub mod config;
pub mod error;
pub mod handler;
pub mod http_client;
pub mod model;
pub mod normalizer;
pub mod notify;
pub mod provider;
pub mod providers;
pub mod repo_info;
pub mod session;
pub mod sink;
pub mod stream;
pub mod telemetry;

pub use config::Config;
pub use error::{CodeGptError, CoreResult, PreconditionError};
pub use handler::{PromptHandler, PromptTarget};
pub use session::{SessionReport, SessionState, StreamSession};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{CodeGptError, CoreResult, PreconditionError};
use crate::repo_info::RepoInfoConfig;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiCfg {
    /// Base URL of the chat-completion endpoint, without the `/v1/...` path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable that contains the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Longest gap between two body reads before the session fails (default 60000ms).
    /// No total request timeout applies.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_idle_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OutputCfg {
    /// Destination document, relative paths resolve against the workspace.
    #[serde(default = "default_output_path")]
    pub path: String,
    /// Echo newly streamed text to stdout as it arrives.
    #[serde(default = "default_follow")]
    pub follow: bool,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            follow: default_follow(),
        }
    }
}

fn default_output_path() -> String {
    "codegpt-response.md".into()
}
fn default_follow() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StreamCfg {
    /// Upper bound on text held while waiting for a JSON event to complete.
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,
}

impl Default for StreamCfg {
    fn default() -> Self {
        Self {
            max_pending_bytes: default_max_pending_bytes(),
        }
    }
}

fn default_max_pending_bytes() -> usize {
    1 << 20
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiCfg,
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub output: OutputCfg,
    #[serde(default)]
    pub stream: StreamCfg,
    #[serde(default)]
    pub repo_info: RepoInfoConfig,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(CodeGptError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| CodeGptError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| CodeGptError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| CodeGptError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| CodeGptError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s).map_err(|e| CodeGptError::Other(e.into()))
                })?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.api.model.trim().is_empty() {
            return Err(CodeGptError::Config("api.model must not be empty".into()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(CodeGptError::Config("api.base_url must not be empty".into()));
        }
        if self.http.idle_timeout_ms == 0 {
            return Err(CodeGptError::Config("http.idle_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve the API key from the process environment.
    pub fn api_key(&self) -> CoreResult<SecretString> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key through `lookup`; a missing or blank value is a precondition failure.
    pub fn api_key_with<F>(&self, lookup: F) -> CoreResult<SecretString>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(&self.api.api_key_env) {
            Some(v) if !v.trim().is_empty() => Ok(SecretString::from(v.trim().to_string())),
            _ => Err(PreconditionError::MissingCredential {
                env: self.api.api_key_env.clone(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_from_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("codegpt.json");
        let json = r#"{
          "api": {"model":"gpt-4o-mini","max_tokens":512,"temperature":0.2},
          "output": {"path":"out/answer.md","follow":false},
          "repo_info": {"codeFileExtensions":[".rs"],"ignored_directories":["target"]}
        }"#;
        fs::write(&file, json).unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.api.model, "gpt-4o-mini");
        assert_eq!(cfg.api.max_tokens, 512);
        assert_eq!(cfg.api.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.output.path, "out/answer.md");
        assert!(!cfg.output.follow);
        assert_eq!(cfg.repo_info.code_file_extensions, vec![".rs".to_string()]);
        assert_eq!(cfg.repo_info.ignored_directories, vec!["target".to_string()]);
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
        assert_eq!(cfg.http.idle_timeout_ms, 60_000);
        assert_eq!(cfg.stream.max_pending_bytes, 1 << 20);
    }

    #[test]
    fn load_from_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("codegpt.toml");
        let toml = r#"
[api]
base_url = "http://localhost:8080"
api_key_env = "LOCAL_KEY"

[http]
idle_timeout_ms = 1500

[stream]
max_pending_bytes = 4096
"#;
        fs::write(&file, toml).unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:8080");
        assert_eq!(cfg.api.api_key_env, "LOCAL_KEY");
        assert_eq!(cfg.api.model, "gpt-4o");
        assert_eq!(cfg.http.idle_timeout_ms, 1_500);
        assert_eq!(cfg.stream.max_pending_bytes, 4096);
        assert_eq!(cfg.output.path, "codegpt-response.md");
    }

    #[test]
    fn missing_file_returns_io_error() {
        let missing = std::path::PathBuf::from("/definitely/not/here/codegpt-missing.json");
        let err = Config::from_path(&missing).unwrap_err();
        match err {
            CodeGptError::Io(_) => {}
            other => panic!("expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn bad_json_returns_other_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.json");
        fs::write(&file, r#"{ "api": { "max_tokens": "lots" }"#).unwrap();
        let err = Config::from_path(&file).unwrap_err();
        match err {
            CodeGptError::Other(_) => {}
            other => panic!("expected Other(json parse) error, got: {:?}", other),
        }
    }

    #[test]
    fn unknown_extension_falls_back_to_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("codegpt.conf");
        fs::write(&file, "[api]\nmodel = \"local-llm\"\n").unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.api.model, "local-llm");
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("codegpt.toml");
        fs::write(&file, "[http]\nidle_timeout_ms = 0\n").unwrap();
        let err = Config::from_path(&file).unwrap_err();
        assert!(matches!(err, CodeGptError::Config(_)));
    }

    #[test]
    fn api_key_lookup() {
        let cfg = Config::default();
        let key = cfg
            .api_key_with(|name| (name == "OPENAI_API_KEY").then(|| " sk-test ".to_string()))
            .unwrap();
        assert_eq!(key.expose_secret(), "sk-test");

        let err = cfg.api_key_with(|_| None).unwrap_err();
        match err {
            CodeGptError::Precondition(PreconditionError::MissingCredential { env }) => {
                assert_eq!(env, "OPENAI_API_KEY")
            }
            other => panic!("expected MissingCredential, got: {:?}", other),
        }

        let blank = cfg.api_key_with(|_| Some("   ".into())).unwrap_err();
        assert!(matches!(blank, CodeGptError::Precondition(_)));
    }
}

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::Config;
use crate::error::CoreResult;
use crate::http_client::HttpClient;
use crate::model::ChatCompletionRequest;
use crate::provider::{ByteStream, CompletionSource};

/// OpenAI-compatible `/v1/chat/completions` endpoint with `stream: true`.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    http: HttpClient,
    base: String,
    name: String, // usually "openai"
    api_key: SecretString,
}

impl OpenAiChat {
    pub fn new(http: HttpClient, api_key: SecretString, base: String) -> Self {
        Self {
            http,
            api_key,
            base: base.trim_end_matches('/').to_string(),
            name: "openai".into(),
        }
    }

    /// Build from configuration; fails early when the API key is missing.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        let api_key = cfg.api_key()?;
        let http = HttpClient::from_cfg(&cfg.http)?;
        Ok(Self::new(http, api_key, cfg.api.base_url.clone()))
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        OpenAiChat::new(
            HttpClient::new_default().unwrap(),
            SecretString::from("test-key".to_string()),
            server_base.to_string(),
        )
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key.expose_secret()),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base)
    }
}

#[async_trait]
impl CompletionSource for OpenAiChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(&self, req: &ChatCompletionRequest) -> CoreResult<ByteStream> {
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tracing::debug!(model = %req.model, url = %self.url(), "opening completion stream");
        self.http.post_stream(&self.url(), req, &hdrs).await
    }
}

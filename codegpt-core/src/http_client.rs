use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::HttpCfg;
use crate::error::{CodeGptError, CoreResult};
use crate::provider::ByteStream;

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_cfg(&HttpCfg::default())
    }

    /// Only the connect timeout is applied here; stalls are bounded by the
    /// session's idle timeout.
    pub fn from_cfg(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder =
            Client::builder().connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| CodeGptError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("codegpt/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    /// POST JSON and hand back the response body as a stream of raw reads.
    /// Non-2xx statuses are mapped to errors before any body byte is yielded.
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<ByteStream> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(error = %e, url, "request failed before a response arrived");
            CodeGptError::ProviderUnavailable {
                provider: "http".into(),
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        if let Some(rid) = extract_request_id(&headers) {
            tracing::debug!(provider_request_id = %rid, %status, "response headers received");
        }
        if !status.is_success() {
            let ra = parse_retry_after(&headers);
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error("http", status, ra, &body));
        }

        let stream = resp.bytes_stream().map(|item| {
            item.map_err(|e| {
                tracing::warn!(error = %e, "response body read failed");
                CodeGptError::ProviderUnavailable {
                    provider: "http".into(),
                }
            })
        });
        Ok(Box::pin(stream))
    }
}

fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    static CANDIDATES: [&str; 3] = ["x-request-id", "request-id", "openai-request-id"];
    for k in CANDIDATES {
        if let Some(v) = headers.get(k)
            && let Ok(s) = v.to_str()
        {
            return Some(s.to_string());
        }
    }
    None
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    None
}

fn map_http_error(
    provider: &str,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> CodeGptError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CodeGptError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        s if s.is_server_error() => CodeGptError::ProviderUnavailable {
            provider: provider.to_string(),
        },
        s => CodeGptError::ProviderError {
            provider: provider.to_string(),
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

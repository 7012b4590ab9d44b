//! One prompt, one streamed answer.
//!
//! State machine: `AwaitingResponseHeaders -> Streaming -> Done`, with `Failed`
//! reachable from either of the first two on transport errors and `Cancelled`
//! when the session's token fires. A `Cancelled` session still flushes and
//! saves what it has; a `Failed` one does not save.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_futures::Instrument;

use crate::config::Config;
use crate::error::CodeGptError;
use crate::model::{ChatCompletionRequest, StopReason};
use crate::notify::Notifier;
use crate::provider::CompletionSource;
use crate::sink::{Document, Flusher};
use crate::stream::{Assembler, StreamNotice};
use crate::telemetry::{self, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingResponseHeaders,
    Streaming,
    Done,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingResponseHeaders => "awaiting_response_headers",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Longest wait for the next body read (or for response headers).
    pub idle_timeout: Duration,
    pub max_pending_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            idle_timeout: Duration::from_millis(cfg.http.idle_timeout_ms),
            max_pending_bytes: cfg.stream.max_pending_bytes,
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub id: u64,
    pub state: SessionState,
    pub output: String,
    /// Events that parsed as chat chunks.
    pub events: u64,
    /// Network reads processed.
    pub reads: u64,
    pub finish_reason: Option<StopReason>,
    pub saved: bool,
    /// Transport failure for `Failed`, or the save failure for `Done`/`Cancelled`.
    pub error: Option<CodeGptError>,
}

impl SessionReport {
    /// Streamed to completion and saved.
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Done && self.error.is_none()
    }
}

pub struct StreamSession<D: Document> {
    id: u64,
    state: SessionState,
    opts: SessionOptions,
    assembler: Assembler,
    flusher: Flusher<D>,
    cancel: CancellationToken,
    reads: u64,
    flush_warned: bool,
}

impl<D: Document> StreamSession<D> {
    pub fn new(doc: D, opts: SessionOptions) -> Self {
        Self {
            id: telemetry::next_session_id(),
            state: SessionState::AwaitingResponseHeaders,
            assembler: Assembler::new(opts.max_pending_bytes),
            flusher: Flusher::new(doc),
            opts,
            cancel: CancellationToken::new(),
            reads: 0,
            flush_warned: false,
        }
    }

    /// Tie the session to an outer token (e.g. a child of the process-wide one).
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn document(&self) -> &D {
        self.flusher.document()
    }

    pub fn into_document(self) -> D {
        self.flusher.into_document()
    }

    /// Send `req` through `source` and stream the answer into the document.
    /// Never returns an error; the outcome is in the report.
    pub async fn run(
        &mut self,
        source: &dyn CompletionSource,
        req: &ChatCompletionRequest,
        notifier: &dyn Notifier,
    ) -> SessionReport {
        let span = telemetry::session_span(self.id, source.name(), &req.model);
        let error = self
            .drive(source, req, notifier)
            .instrument(span.clone())
            .await;

        let finish_reason = self.assembler.finish_reason();
        telemetry::record_summary(
            &span,
            &SessionSummary {
                events: self.assembler.events(),
                chars: self.assembler.output().chars().count(),
                finish_reason: finish_reason.as_ref().map(StopReason::as_str),
                state: self.state.as_str(),
                error_kind: error.as_ref().map(CodeGptError::kind),
            },
        );
        span.in_scope(|| {
            tracing::info!(
                state = self.state.as_str(),
                reads = self.reads,
                events = self.assembler.events(),
                "session finished"
            )
        });

        SessionReport {
            id: self.id,
            state: self.state,
            output: self.assembler.output().to_string(),
            events: self.assembler.events(),
            reads: self.reads,
            finish_reason,
            saved: self.flusher.is_saved() && !matches!(error, Some(CodeGptError::Persistence { .. })),
            error,
        }
    }

    async fn drive(
        &mut self,
        source: &dyn CompletionSource,
        req: &ChatCompletionRequest,
        notifier: &dyn Notifier,
    ) -> Option<CodeGptError> {
        self.state = SessionState::AwaitingResponseHeaders;
        let idle = self.opts.idle_timeout;
        let cancel = self.cancel.clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(idle, source.open_stream(req)) => Some(r),
        };
        let mut stream = match opened {
            None => return self.complete(SessionState::Cancelled, notifier).await,
            Some(Err(_)) => return self.fail(self.idle_error(), notifier),
            Some(Ok(Err(e))) => return self.fail(e, notifier),
            Some(Ok(Ok(s))) => s,
        };
        self.state = SessionState::Streaming;
        tracing::debug!("response headers received, streaming");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = tokio::time::timeout(idle, stream.next()) => Some(r),
            };
            match next {
                None => return self.complete(SessionState::Cancelled, notifier).await,
                Some(Err(_)) => return self.fail(self.idle_error(), notifier),
                Some(Ok(None)) => break,
                Some(Ok(Some(Err(e)))) => return self.fail(e, notifier),
                Some(Ok(Some(Ok(bytes)))) => {
                    self.reads += 1;
                    let notices = self.assembler.push_bytes(&bytes);
                    self.report(notices, notifier);
                    self.flush(notifier).await;
                    if self.assembler.is_terminal() {
                        break;
                    }
                }
            }
        }
        self.complete(SessionState::Done, notifier).await
    }

    fn idle_error(&self) -> CodeGptError {
        CodeGptError::IdleTimeout {
            idle_ms: self.opts.idle_timeout.as_millis() as u64,
        }
    }

    fn report(&self, notices: Vec<StreamNotice>, notifier: &dyn Notifier) {
        for n in notices {
            notifier.warn(&n.message());
            let e = CodeGptError::from(n);
            tracing::debug!(error = %e, kind = e.kind(), "stream notice reported");
        }
    }

    async fn flush(&mut self, notifier: &dyn Notifier) {
        if let Err(e) = self.flusher.flush(self.assembler.output()).await {
            tracing::warn!(error = %e, "document update failed");
            if !self.flush_warned {
                self.flush_warned = true;
                notifier.warn(&format!("Could not update the response document: {e}"));
            }
        }
    }

    /// Drain the assembler, write the final text and save exactly once.
    async fn complete(&mut self, state: SessionState, notifier: &dyn Notifier) -> Option<CodeGptError> {
        if state == SessionState::Cancelled {
            tracing::info!(reads = self.reads, "session cancelled, keeping partial output");
        }
        let notices = self.assembler.finish();
        self.report(notices, notifier);
        self.flush(notifier).await;
        self.state = state;

        let location = self.flusher.document().location();
        match self.flusher.save_once().await {
            Ok(true) => {
                let msg = match state {
                    SessionState::Cancelled => format!("Request cancelled; partial response saved to {location}"),
                    _ => format!("Response saved to {location}"),
                };
                notifier.info(&msg);
                None
            }
            Ok(false) => None,
            Err(e) => {
                tracing::error!(error = %e, "saving the response failed");
                notifier.error(&format!("Failed to save the response: {e}"));
                Some(e)
            }
        }
    }

    fn fail(&mut self, e: CodeGptError, notifier: &dyn Notifier) -> Option<CodeGptError> {
        tracing::error!(error = %e, kind = e.kind(), "session failed");
        self.state = SessionState::Failed;
        notifier.error(&format!("Request failed: {e}"));
        Some(e)
    }
}

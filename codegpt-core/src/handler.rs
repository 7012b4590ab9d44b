use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{CodeGptError, CoreResult, PreconditionError};
use crate::model::{ChatCompletionRequest, PanelMessage};
use crate::normalizer::{normalize_prompt, normalize_request};
use crate::notify::Notifier;
use crate::provider::CompletionSource;
use crate::repo_info;
use crate::session::{SessionOptions, SessionReport, StreamSession};
use crate::sink::FileDocument;

/// Where and how one prompt is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTarget {
    pub workspace: Option<PathBuf>,
    /// Destination document; relative paths resolve against the workspace.
    pub output: PathBuf,
    pub include_repo_info: bool,
}

impl PromptTarget {
    pub fn resolved_output(&self) -> PathBuf {
        match &self.workspace {
            Some(ws) if self.output.is_relative() => ws.join(&self.output),
            _ => self.output.clone(),
        }
    }
}

/// Turns a submitted prompt into a streamed answer on disk.
#[derive(Clone)]
pub struct PromptHandler {
    config: Config,
    source: Arc<dyn CompletionSource>,
    notifier: Arc<dyn Notifier>,
}

impl PromptHandler {
    pub fn new(config: Config, source: Arc<dyn CompletionSource>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            source,
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatch a panel message. Unknown commands are ignored (`Ok(None)`).
    pub async fn handle_message(
        &self,
        msg: PanelMessage,
        target: &PromptTarget,
        cancel: CancellationToken,
    ) -> CoreResult<Option<SessionReport>> {
        let prompt = match msg.into_prompt() {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::debug!("ignoring unknown panel command");
                return Ok(None);
            }
            Err(e) => return Err(self.refuse(e)),
        };
        self.handle_prompt(&prompt, target, cancel).await.map(Some)
    }

    /// Validate, build the request and run one session. Preconditions are
    /// checked before any network I/O; everything after that is in the report.
    pub async fn handle_prompt(
        &self,
        prompt: &str,
        target: &PromptTarget,
        cancel: CancellationToken,
    ) -> CoreResult<SessionReport> {
        let user = normalize_prompt(prompt);
        if user.is_empty() {
            return Err(self.refuse(PreconditionError::EmptyInput.into()));
        }

        let system = if target.include_repo_info {
            let info = self.gather_repo_info(target.workspace.as_deref()).await.map_err(|e| self.refuse(e))?;
            repo_info::system_prompt(Some(&info))
        } else {
            repo_info::system_prompt(None)
        };

        let api = &self.config.api;
        let req = normalize_request(ChatCompletionRequest::streaming(
            api.model.clone(),
            system,
            user,
            api.max_tokens,
            api.temperature,
        ));

        let output = target.resolved_output();
        let mut doc = FileDocument::create(&output).await.map_err(|e| self.refuse(e))?;
        if self.config.output.follow {
            doc = doc.with_echo(Box::new(std::io::stdout()));
        }
        tracing::info!(model = %req.model, output = %output.display(), "submitting prompt");

        let mut session =
            StreamSession::new(doc, SessionOptions::from(&self.config)).with_cancel(cancel);
        Ok(session.run(self.source.as_ref(), &req, self.notifier.as_ref()).await)
    }

    async fn gather_repo_info(&self, workspace: Option<&Path>) -> CoreResult<String> {
        let dir = workspace
            .map(Path::to_path_buf)
            .ok_or_else(|| PreconditionError::NoWorkspace("no workspace directory given".into()))?;
        let cfg = self.config.repo_info.clone();
        let notifier = self.notifier.clone();
        tokio::task::spawn_blocking(move || repo_info::generate_repo_info(&dir, &cfg, notifier.as_ref()))
            .await
            .map_err(|e| CodeGptError::Other(e.into()))?
    }

    fn refuse(&self, e: CodeGptError) -> CodeGptError {
        tracing::warn!(error = %e, kind = e.kind(), "prompt refused");
        self.notifier.error(&e.to_string());
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Level, RecordingNotifier};
    use crate::provider::ScriptedSource;
    use crate::providers::OpenAiChat;
    use crate::session::SessionState;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use tempfile::tempdir;

    fn quiet_config() -> Config {
        let mut cfg = Config::default();
        cfg.output.follow = false;
        cfg
    }

    fn handler(source: Arc<dyn CompletionSource>) -> (PromptHandler, Arc<RecordingNotifier>) {
        let n = Arc::new(RecordingNotifier::new());
        (PromptHandler::new(quiet_config(), source, n.clone()), n)
    }

    #[tokio::test]
    async fn submit_streams_into_output_file() {
        let ws = tempdir().unwrap();
        let src = ScriptedSource::new(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel",
            "lo\"}}]}\n",
            "data: [DONE]\n",
        ]);
        let (h, n) = handler(Arc::new(src));
        let target = PromptTarget {
            workspace: Some(ws.path().to_path_buf()),
            output: PathBuf::from("out/answer.md"),
            include_repo_info: false,
        };
        let report = h
            .handle_message(
                PanelMessage::Submit {
                    text: Some("  say hello  ".into()),
                },
                &target,
                CancellationToken::new(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.state, SessionState::Done);
        assert_eq!(
            std::fs::read_to_string(ws.path().join("out/answer.md")).unwrap(),
            "Hello"
        );
        assert_eq!(n.count(Level::Info), 1);
    }

    #[tokio::test]
    async fn blank_submit_is_refused_before_any_request() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).body("data: [DONE]\n");
        });
        let (h, n) = handler(Arc::new(OpenAiChat::new_for_tests(&server.base_url())));
        let ws = tempdir().unwrap();
        let target = PromptTarget {
            workspace: Some(ws.path().to_path_buf()),
            output: PathBuf::from("a.md"),
            include_repo_info: false,
        };
        let err = h
            .handle_message(
                PanelMessage::Submit {
                    text: Some(" \n ".into()),
                },
                &target,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeGptError::Precondition(PreconditionError::EmptyInput)
        ));
        assert_eq!(n.count(Level::Error), 1);
        assert!(!ws.path().join("a.md").exists());
        m.assert_hits(0);
    }

    #[tokio::test]
    async fn unknown_command_is_ignored() {
        let (h, n) = handler(Arc::new(ScriptedSource::default()));
        let target = PromptTarget {
            workspace: None,
            output: PathBuf::from("unused.md"),
            include_repo_info: false,
        };
        let out = h
            .handle_message(PanelMessage::Unknown, &target, CancellationToken::new())
            .await
            .unwrap();
        assert!(out.is_none());
        assert!(n.entries().is_empty());
    }

    #[tokio::test]
    async fn repo_info_without_workspace_is_refused() {
        let (h, _n) = handler(Arc::new(ScriptedSource::default()));
        let dir = tempdir().unwrap();
        let target = PromptTarget {
            workspace: None,
            output: dir.path().join("a.md"),
            include_repo_info: true,
        };
        let err = h
            .handle_prompt("hi", &target, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CodeGptError::Precondition(PreconditionError::NoWorkspace(_))
        ));
    }

    #[tokio::test]
    async fn request_carries_repo_snapshot_and_normalized_prompt() {
        let ws = tempdir().unwrap();
        std::fs::write(ws.path().join("main.py"), "print('snapshot')").unwrap();

        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("The basic structure of the app is as follows")
                .body_contains("print('snapshot')")
                .body_contains("\"content\":\"é\"");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n");
        });

        let (h, _n) = handler(Arc::new(OpenAiChat::new_for_tests(&server.base_url())));
        let target = PromptTarget {
            workspace: Some(ws.path().to_path_buf()),
            output: PathBuf::from("answer.md"),
            include_repo_info: true,
        };
        let report = h
            .handle_prompt("\u{FEFF} e\u{301} ", &target, CancellationToken::new())
            .await
            .unwrap();
        m.assert();
        assert_eq!(report.output, "ok");
        assert_eq!(
            std::fs::read_to_string(ws.path().join("answer.md")).unwrap(),
            "ok"
        );
    }

    #[test]
    fn absolute_output_ignores_workspace() {
        let t = PromptTarget {
            workspace: Some(PathBuf::from("/ws")),
            output: PathBuf::from("/tmp/x.md"),
            include_repo_info: false,
        };
        assert_eq!(t.resolved_output(), PathBuf::from("/tmp/x.md"));
        let t = PromptTarget {
            output: PathBuf::from("x.md"),
            ..t
        };
        assert_eq!(t.resolved_output(), PathBuf::from("/ws/x.md"));
    }
}

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use codegpt_core::{
    config::Config,
    model::PanelMessage,
    notify::Notifier,
    providers::OpenAiChat,
    repo_info,
    session::SessionState,
    PromptHandler, PromptTarget, SessionReport,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Ask questions about a repository and stream the answer into a markdown file", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt and stream the answer
    Ask {
        /// Prompt text (omit with --stdin)
        prompt: Option<String>,
        /// Read the prompt from stdin
        #[arg(long)]
        stdin: bool,
        /// Repository root used for the snapshot and relative output paths
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Destination document (default from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        /// Send the prompt without a repository snapshot
        #[arg(long)]
        no_repo_info: bool,
        /// Do not echo the answer to stdout
        #[arg(short, long)]
        quiet: bool,
    },
    /// Read panel messages (JSON lines) from stdin, one session per submit
    Serve {
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Directory receiving response-<n>.md files (default: workspace)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        no_repo_info: bool,
    },
    /// Print the system prompt that would be sent for a workspace
    RepoInfo {
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

/// Notifications go to stderr so stdout can carry the answer.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn info(&self, msg: &str) {
        eprintln!("{msg}");
    }
    fn warn(&self, msg: &str) {
        eprintln!("warning: {msg}");
    }
    fn error(&self, msg: &str) {
        eprintln!("error: {msg}");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Ok(Config::from_path(p)?),
        None => Ok(Config::default()),
    }
}

fn workspace_or_cwd(ws: Option<PathBuf>) -> Option<PathBuf> {
    ws.or_else(|| std::env::current_dir().ok())
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            token.cancel();
        }
    });
}

fn exit_code(report: &SessionReport) -> ExitCode {
    match report.state {
        _ if report.is_success() => ExitCode::SUCCESS,
        SessionState::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask {
            prompt,
            stdin,
            workspace,
            output,
            model,
            no_repo_info,
            quiet,
        } => {
            if let Some(m) = model {
                cfg.api.model = m;
            }
            if quiet {
                cfg.output.follow = false;
            }
            cfg.validate()?;
            let prompt = if stdin {
                let mut buf = String::new();
                tokio::io::stdin().read_to_string(&mut buf).await?;
                buf
            } else {
                prompt.unwrap_or_default()
            };

            let source = Arc::new(OpenAiChat::from_config(&cfg)?);
            let target = PromptTarget {
                workspace: workspace_or_cwd(workspace),
                output: output.unwrap_or_else(|| PathBuf::from(&cfg.output.path)),
                include_repo_info: !no_repo_info,
            };
            let follow = cfg.output.follow;
            let handler = PromptHandler::new(cfg, source, Arc::new(ConsoleNotifier));

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            // Preconditions were already reported through the notifier.
            let Ok(report) = handler.handle_prompt(&prompt, &target, cancel).await else {
                return Ok(ExitCode::from(2));
            };
            if follow && !report.output.is_empty() {
                println!();
            }
            Ok(exit_code(&report))
        }

        Commands::Serve {
            workspace,
            output_dir,
            no_repo_info,
        } => {
            // Concurrent answers would interleave on stdout.
            cfg.output.follow = false;
            let workspace = workspace_or_cwd(workspace);
            let output_dir = output_dir
                .or_else(|| workspace.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let source = Arc::new(OpenAiChat::from_config(&cfg)?);
            let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
            let handler = PromptHandler::new(cfg, source, notifier.clone());

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut sessions = Vec::new();
            let mut n = 0u64;
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => line?,
                };
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let msg: PanelMessage = match serde_json::from_str(&line) {
                    Ok(m) => m,
                    Err(e) => {
                        notifier.warn(&format!("ignoring unreadable message: {e}"));
                        continue;
                    }
                };
                if matches!(msg, PanelMessage::Unknown) {
                    tracing::debug!("ignoring unknown panel command");
                    continue;
                }
                n += 1;
                let target = PromptTarget {
                    workspace: workspace.clone(),
                    output: output_dir.join(format!("response-{n}.md")),
                    include_repo_info: !no_repo_info,
                };
                let handler = handler.clone();
                let token = cancel.child_token();
                sessions.push(tokio::spawn(async move {
                    handler.handle_message(msg, &target, token).await
                }));
            }

            let mut failed = 0usize;
            for s in sessions {
                match s.await {
                    Ok(Ok(Some(report))) if report.is_success() => {}
                    Ok(Ok(None)) => {}
                    Ok(_) => failed += 1,
                    Err(e) => {
                        tracing::error!(error = %e, "session task panicked");
                        failed += 1;
                    }
                }
            }
            tracing::info!(sessions = n, failed, "serve finished");
            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::RepoInfo { workspace } => {
            let dir = workspace_or_cwd(workspace).unwrap_or_else(|| PathBuf::from("."));
            let info = repo_info::generate_repo_info(&dir, &cfg.repo_info, &ConsoleNotifier)?;
            print!("{}", repo_info::system_prompt(Some(&info)));
            Ok(ExitCode::SUCCESS)
        }
    }
}

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use pdfchat_session::{
    ChatSession, ClientSettings, Endpoints, HttpUploader, SessionError, UploadResponse,
    UploadResult, WebSocketConnector, read_selection,
};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::render::{Transcript, prompt_hint};

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("invalid endpoint configuration on `{stage}`: {source}"))]
    Endpoints {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("terminal I/O failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: io::Error,
    },
}

pub type CliResult<T> = Result<T, CliError>;

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(Vec<PathBuf>),
    Quit,
    Say(String),
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed == "/quit" || trimmed == "/exit" {
        return Command::Quit;
    }
    if let Some(rest) = trimmed.strip_prefix("/upload")
        && (rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        return Command::Upload(rest.split_whitespace().map(PathBuf::from).collect());
    }
    Command::Say(line.to_string())
}

struct Uploads {
    limit_bytes: u64,
    results_tx: mpsc::UnboundedSender<UploadResult<UploadResponse>>,
}

impl Uploads {
    /// Reads the selected paths and starts the request on its own task.
    async fn start(&self, session: &mut ChatSession, paths: &[PathBuf]) {
        let selection = read_selection(paths, self.limit_bytes).await;
        for error in &selection.rejected {
            session.notify(format!("Skipped: {error}"));
        }

        let Some(task) = session.begin_upload(selection.files) else {
            return;
        };
        let results_tx = self.results_tx.clone();
        tokio::spawn(async move {
            let _ = results_tx.send(task.await);
        });
    }
}

/// What the loop does after one line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Input arrived while an upload is in flight and was dropped.
    Busy,
    Quit,
}

/// Applies one line of input. `None` is end of input.
async fn handle_input(
    session: &mut ChatSession,
    uploads: &Uploads,
    line: Option<String>,
) -> Flow {
    let Some(line) = line else {
        return Flow::Quit;
    };
    match parse_command(&line) {
        Command::Quit => Flow::Quit,
        _ if session.is_loading() => Flow::Busy,
        Command::Upload(paths) => {
            uploads.start(session, &paths).await;
            Flow::Continue
        }
        Command::Say(text) => {
            if !session.send_text(text) {
                tracing::debug!(state = ?session.connection_state(), "message not sent");
            }
            Flow::Continue
        }
    }
}

/// Applies a finished upload and returns the hint to show once a session is open.
fn upload_finished(
    session: &mut ChatSession,
    result: UploadResult<UploadResponse>,
) -> Option<&'static str> {
    session.finish_upload(result);
    session.has_session().then_some(prompt_hint(session))
}

/// Runs the interactive chat until `/quit` or end of input.
pub async fn run(settings: ClientSettings, initial_files: Vec<PathBuf>) -> CliResult<()> {
    let endpoints = Endpoints::from_settings(&settings).context(EndpointsSnafu {
        stage: "resolve-endpoints",
    })?;
    tracing::info!(
        upload = %endpoints.upload_url(),
        secure = endpoints.is_secure(),
        "endpoints resolved"
    );

    let uploader = Arc::new(HttpUploader::new(endpoints.upload_url().clone()));
    let (mut session, mut channel_events) = ChatSession::new(
        endpoints,
        settings.notices,
        uploader,
        Arc::new(WebSocketConnector),
    );
    let (results_tx, mut upload_results) = mpsc::unbounded_channel();
    let uploads = Uploads {
        limit_bytes: settings.max_file_size_bytes,
        results_tx,
    };

    let mut stdout = io::stdout();
    let mut transcript = Transcript::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", prompt_hint(&session).dimmed());
    if !initial_files.is_empty() {
        uploads.start(&mut session, &initial_files).await;
    }

    loop {
        transcript
            .flush(&session, &mut stdout)
            .context(TerminalSnafu {
                stage: "render-transcript",
            })?;

        tokio::select! {
            line = lines.next_line() => {
                let line = line.context(TerminalSnafu { stage: "read-input" })?;
                match handle_input(&mut session, &uploads, line).await {
                    Flow::Continue => {}
                    Flow::Busy => println!("{}", "Processing...".dimmed()),
                    Flow::Quit => break,
                }
            }
            Some(event) = channel_events.recv() => session.handle_channel_event(event),
            Some(result) = upload_results.recv() => {
                if let Some(hint) = upload_finished(&mut session, result) {
                    println!("{}", hint.dimmed());
                }
            }
        }
    }

    session.shutdown(settings.close_grace()).await;
    transcript
        .flush(&session, &mut stdout)
        .context(TerminalSnafu {
            stage: "render-final-transcript",
        })?;
    Ok(())
}

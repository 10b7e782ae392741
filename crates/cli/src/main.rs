#![deny(unsafe_code)]

mod app;
mod render;

use std::path::PathBuf;

use clap::Parser;
use pdfchat_session::ClientSettings;
use tracing_subscriber::EnvFilter;

/// Chat with an assistant about a set of uploaded PDFs.
#[derive(Debug, Parser)]
#[command(name = "pdfchat", version)]
struct Args {
    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long)]
    server: Option<String>,
    /// Settings file to read instead of the per-user default
    #[arg(long)]
    config: Option<PathBuf>,
    /// PDF files to upload on start
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), app::CliError> {
    // Logs go to stderr so they never interleave with the transcript on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = match &args.config {
        Some(path) => ClientSettings::load_from(path),
        None => ClientSettings::load(),
    };
    if let Some(server) = args.server {
        settings = settings.with_server_url(server);
    }

    app::run(settings, args.files).await
}

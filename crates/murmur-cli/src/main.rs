//! Murmur - streaming chat for local LLM servers
//!
//! A terminal host for the Murmur core:
//! - `murmur chat`: interactive chat with streamed replies
//! - `murmur models`: list the server's models
//! - `murmur render`: Markdown file to HTML with the streaming renderer

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use murmur_core::{paths, ChatConfig, ChatSession, ConnectionStatus, RenderPipeline};

mod chat;
mod clipboard;
mod commands;
mod page;

/// Murmur - chat with a local LLM server
#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Streaming chat client for local LLM servers", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.murmur/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server base URL, e.g. http://127.0.0.1:8080/v1
    #[arg(long, global = true)]
    server: Option<String>,

    /// Model id to request
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,

    /// List the models the server serves
    Models,

    /// Render a Markdown file to HTML on stdout
    Render {
        /// Markdown file to render
        file: PathBuf,

        /// Emit a complete HTML page instead of a fragment
        #[arg(long)]
        standalone: bool,
    },
}

impl Cli {
    /// Config file, then environment, then flags
    fn load_config(&self) -> Result<ChatConfig> {
        let mut config = match &self.config {
            Some(path) => ChatConfig::load_from(path)?,
            None => ChatConfig::load_from(&paths::config_file())?,
        };
        config.apply_env();
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        Ok(config)
    }
}

/// Initialize logging to file (stdout carries the conversation)
fn init_logging() -> Result<()> {
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_file = match std::fs::File::create(paths::log_file()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to create log file: {}, falling back to null device",
                e
            );
            match std::fs::File::create(null_device) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!(
                        "Failed to create null device {}: {}, logging disabled",
                        null_device, e
                    );
                    return Err(e.into());
                }
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = cli.load_config()?;
    tracing::info!("Using server {}", config.base_url());

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let session = ChatSession::with_local_server(config)?;
            chat::run(session).await?;
        }
        Commands::Models => {
            let mut session = ChatSession::with_local_server(config)?;
            let models = session.refresh_models().await;
            if let ConnectionStatus::Failure { message } = session.connection_status() {
                anyhow::bail!("server not reachable: {}", message);
            }
            for model in models {
                println!("{}", model.id);
            }
        }
        Commands::Render { file, standalone } => {
            let markdown = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let mut pipeline: RenderPipeline<PathBuf> = RenderPipeline::new(config.render.clone());
            let output = pipeline.render(&file, &markdown, false);
            if standalone {
                println!("{}", page::standalone_page(&output.html, &config.render));
            } else {
                println!("{}", output.html);
            }
        }
    }

    Ok(())
}

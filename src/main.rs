mod cli;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kbridge::config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kbridge", version, about = "Session lifecycle and knowledge bridge for agent runtimes")]
struct Cli {
    /// Config file (defaults to ~/.kbridge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle host lifecycle events as NDJSON on stdin
    Serve,
    /// Check that the substrate is reachable (non-zero exit if not)
    Health,
    /// Recall knowledge for a query
    Recall {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Store a memory
    Store {
        content: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        importance: Option<f64>,
    },
    /// Search compiled articles (and optionally sources)
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        sources: bool,
    },
    /// Ingest a local file as a source
    Ingest {
        path: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Refresh the disaster-recovery snapshot once
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::BridgeConfig::load_from(path)?,
        None => config::BridgeConfig::load()?,
    };

    // Log to stderr so stdout stays clean for hook replies.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_stdio(config).await?,
        Command::Health => cli::health::health(&config).await?,
        Command::Recall { query, limit } => cli::recall::recall(&config, &query, limit).await?,
        Command::Store {
            content,
            tags,
            importance,
        } => cli::store::store(&config, &content, tags, importance).await?,
        Command::Search {
            query,
            limit,
            sources,
        } => cli::search::search(&config, &query, limit, sources).await?,
        Command::Ingest { path, title, tags } => {
            cli::ingest::ingest(&config, &path, title, tags).await?
        }
        Command::Sync => cli::sync::sync(&config).await?,
    }

    Ok(())
}

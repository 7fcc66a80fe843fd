use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ops_rag::commands::{IndexTarget, ask, chat, configure, index, resolve_config_dir, show_status};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ops-rag")]
#[command(about = "Ask questions about a service's logs and source code")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to $OPS_RAG_HOME or ~/.ops-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure models, repository and log locations
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build or refresh the vector indexes
    Index {
        /// Which index to build
        #[arg(long, value_enum, default_value_t = IndexTarget::All)]
        target: IndexTarget,
        /// Ignore cached indexes and re-embed everything
        #[arg(long)]
        rebuild: bool,
    },
    /// Start an interactive question loop
    Chat {
        /// Ignore cached indexes and re-embed everything
        #[arg(long)]
        rebuild: bool,
    },
    /// Ask a single question
    Ask {
        question: String,
        /// Ignore cached indexes and re-embed everything
        #[arg(long)]
        rebuild: bool,
    },
    /// Show the cached indexes and model connectivity
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            configure(&config_dir, show)?;
        }
        Commands::Index { target, rebuild } => {
            index(&config_dir, target, rebuild).await?;
        }
        Commands::Chat { rebuild } => {
            chat(&config_dir, rebuild).await?;
        }
        Commands::Ask { question, rebuild } => {
            ask(&config_dir, &question, rebuild).await?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, run_interactive_config, show_config};
use crate::embeddings::{Embedder, OllamaClient};
use crate::index::IndexManifest;
use crate::llm::TokenCounter;
use crate::pipeline::{ServiceContext, build_agent, code_index, log_index};
use crate::repl::run_repl;

/// Which of the two indexes a command applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IndexTarget {
    Code,
    Logs,
    #[default]
    All,
}

impl IndexTarget {
    #[inline]
    pub fn includes_code(self) -> bool {
        matches!(self, Self::Code | Self::All)
    }

    #[inline]
    pub fn includes_logs(self) -> bool {
        matches!(self, Self::Logs | Self::All)
    }
}

/// `--config-dir` when given, otherwise the default configuration directory
#[inline]
pub fn resolve_config_dir(config_dir: Option<&Path>) -> Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Ok(Config::default_dir()?),
    }
}

/// Interactive setup, or print the current configuration with `show`
#[inline]
pub fn configure(config_dir: &Path, show: bool) -> Result<()> {
    if show {
        show_config(config_dir)
    } else {
        run_interactive_config(config_dir)
    }
}

/// Build or refresh the selected indexes without starting a conversation
#[inline]
pub async fn index(config_dir: &Path, target: IndexTarget, rebuild: bool) -> Result<()> {
    let config = Config::load(config_dir)?;
    let token_counter = Arc::new(TokenCounter::default());
    let embedder: Arc<dyn Embedder> = Arc::new(
        OllamaClient::new(&config.ollama)?.with_token_counter(Arc::clone(&token_counter)),
    );

    if target.includes_code() {
        let index = code_index(&config, &embedder, rebuild)
            .await
            .context("Failed to build the code index")?;
        println!("code nodes size -> {}", index.node_count());
    }

    if target.includes_logs() {
        let index = log_index(&config, &embedder, rebuild)
            .await
            .context("Failed to build the log index")?;
        println!("log nodes size -> {}", index.node_count());
    }

    println!("{}", style(token_counter.snapshot()).dim());
    Ok(())
}

fn print_node_sizes(config: &Config) -> Result<()> {
    if let Some(manifest) = IndexManifest::read(&config.cache.code_dir)? {
        println!("code nodes size -> {}", manifest.node_count);
    }
    if let Some(manifest) = IndexManifest::read(&config.cache.logs_dir)? {
        println!("log nodes size -> {}", manifest.node_count);
    }
    Ok(())
}

/// Build both tools (reusing the cache) and answer questions from stdin
#[inline]
pub async fn chat(config_dir: &Path, rebuild: bool) -> Result<()> {
    let ctx = ServiceContext::from_config(Config::load(config_dir)?)?;
    let mut agent = build_agent(&ctx, rebuild).await?;
    print_node_sizes(&ctx.config)?;

    println!(
        "{}",
        style("Type 'exit' to quit, 'clear' to forget the conversation.").dim()
    );

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();
    let result = run_repl(&mut agent, input, &mut output).await;

    println!("{}", style(ctx.token_counter.snapshot()).dim());

    let summary = result?;
    info!(
        "Session finished after {} questions and {} clears",
        summary.questions, summary.clears
    );
    Ok(())
}

/// Answer a single question and exit
#[inline]
pub async fn ask(config_dir: &Path, question: &str, rebuild: bool) -> Result<()> {
    let ctx = ServiceContext::from_config(Config::load(config_dir)?)?;
    let mut agent = build_agent(&ctx, rebuild).await?;

    let response = agent.chat(question).await?;
    println!("{}", response);

    if !response.sources.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for source in &response.sources {
            for node in &source.source_nodes {
                println!(
                    "   {} {} ({:.3})",
                    style(&source.tool_name).cyan(),
                    node.node.file_path,
                    node.similarity_score
                );
            }
        }
    }

    println!("{}", style(ctx.token_counter.snapshot()).dim());
    Ok(())
}

fn print_manifest(label: &str, dir: &Path) {
    println!("{} {}", style(label).bold(), style(dir.display()).dim());
    match IndexManifest::read(dir) {
        Ok(Some(manifest)) => {
            println!("   ✅ Built {}", manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("   📋 Model: {} ({} dimensions)", manifest.embedding_model, manifest.dimension);
            println!("   📄 Documents: {}", manifest.document_count);
            println!("   🧩 Nodes: {}", manifest.node_count);
        }
        Ok(None) => println!("   ❌ Not built yet. Run 'ops-rag index' to build it."),
        Err(e) => {
            warn!("Unreadable manifest in {}: {}", dir.display(), e);
            println!("   ⚠️  Manifest unreadable - {}", e);
        }
    }
}

/// Show the cached index manifests and model connectivity
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;

    println!("📊 ops-rag Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match tokio::task::spawn_blocking(move || client.health_check()).await? {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
            }
            Err(e) => println!("   ⚠️  Ollama: Unhealthy - {}", e),
        },
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {}", e),
    }

    let key_present = std::env::var(&config.llm.api_key_env)
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);
    println!("💬 LLM: {} at {}", config.llm.model, config.llm.base_url);
    if key_present {
        println!("   ✅ {} is set", config.llm.api_key_env);
    } else {
        println!("   ❌ {} is not set", config.llm.api_key_env);
    }
    println!();

    print_manifest("Code index", &config.cache.code_dir);
    print_manifest("Log index", &config.cache.logs_dir);

    Ok(())
}

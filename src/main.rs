//! Chatter CLI entry point.

use anyhow::Context as _;
use chatter::agent::Generator;
use chatter::config::Config;
use chatter::llm::{ChatCompletionModel, LlmManager};
use chatter::messaging::{ChatPlatformDyn, DiscordAdapter};
use chatter::scheduler::Scheduler;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatter")]
#[command(about = "Keeps a chat channel company with short LLM-written messages")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Generate messages but log them instead of posting
    #[arg(long)]
    dry_run: bool,

    /// Seed for model, topic and interval selection
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load configuration from environment".to_string(),
    })?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    tracing::info!(
        channel_id = %config.discord.channel_id,
        models = ?config.llm.models,
        "configuration loaded"
    );

    let llm_manager = Arc::new(
        LlmManager::new(config.llm.clone()).with_context(|| "failed to initialize LLM manager")?,
    );
    let model = ChatCompletionModel::new(llm_manager);

    let platform: Arc<dyn ChatPlatformDyn> = Arc::new(
        DiscordAdapter::new(&config.discord)
            .with_context(|| "failed to initialize Discord adapter")?,
    );

    let generator = Generator::from_config(model, &config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    Scheduler::new(platform, generator, &config, shutdown_rx)
        .dry_run(cli.dry_run)
        .run_once(cli.once)
        .run()
        .await
        .with_context(|| "chatter could not start")?;

    tracing::info!("chatter stopped");
    Ok(())
}

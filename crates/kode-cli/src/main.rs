use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod prompt;
mod renderer;
mod session;

use config::{Overrides, Settings};
use kode::agent::Agent;
use kode::providers::anthropic::AnthropicProvider;
use kode::registry::{AgentRegistry, AllowedTools};
use prompt::rustyline::RustylinePrompt;
use renderer::TerminalSink;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Workspace root the tools are confined to (defaults to the current directory)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Anthropic API key (can also be set via KODE_PROVIDER__API_KEY or ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of an Anthropic-compatible messages API
    #[arg(long)]
    host: Option<String>,

    /// How many levels of sub-agents may be nested
    #[arg(long)]
    max_depth: Option<usize>,

    /// Path to a TOML config file (defaults to ~/.config/kode/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive session
    Session,

    /// Run a single task non-interactively
    Run {
        /// The task to run
        #[arg(short, long)]
        text: String,
    },

    /// List the sub-agent types and their tools
    Agents,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("KODE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_agents(registry: &AgentRegistry) {
    for spec in registry.types() {
        let tools = match &spec.allowed_tools {
            AllowedTools::All => "all tools".to_string(),
            AllowedTools::Only(names) => names.join(", "),
        };
        println!(
            "{} {}\n  {}",
            style(&spec.name).bold(),
            style(format!("({})", tools)).dim(),
            spec.description
        );
    }
}

fn build_agent(cli: &Cli) -> Result<Agent> {
    let overrides = Overrides {
        workdir: cli.workdir.clone(),
        model: cli.model.clone(),
        api_key: cli.api_key.clone(),
        host: cli.host.clone(),
        max_depth: cli.max_depth,
    };
    let mut settings = Settings::load(cli.config.as_deref(), &overrides)?;
    settings.workdir = settings
        .workdir
        .canonicalize()
        .with_context(|| format!("Workspace {} is not accessible", settings.workdir.display()))?;

    let provider = AnthropicProvider::new(settings.provider_config())?;
    tracing::info!(
        workdir = %settings.workdir.display(),
        model = provider.model(),
        max_depth = settings.max_depth,
        "starting agent"
    );
    let agent = Agent::with_builtin_systems(Arc::new(provider), settings.agent_config())?;
    Ok(agent)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::Agents) => {
            list_agents(&AgentRegistry::builtin());
            Ok(())
        }
        Some(Command::Run { text }) => {
            let agent = build_agent(&cli)?;
            let prompt = RustylinePrompt::new()?;
            let mut session = Session::new(agent, Box::new(prompt), Arc::new(TerminalSink::new()));
            session.headless_start(text.clone()).await?;
            tracing::debug!(messages = session.messages().len(), "run finished");
            Ok(())
        }
        Some(Command::Session) | None => {
            let agent = build_agent(&cli)?;
            let prompt = RustylinePrompt::new()?;
            let mut session = Session::new(agent, Box::new(prompt), Arc::new(TerminalSink::new()));
            session.start().await
        }
    }
}

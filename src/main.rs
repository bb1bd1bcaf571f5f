mod agent;
mod backoff;
mod chat;
mod config;
mod gateway;
mod llm;
mod permissions;
mod skills;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::agent::AgentRuntime;
use crate::backoff::Backoff;
use crate::config::Config;
use crate::gateway::CommandGateway;
use crate::llm::LlmClient;
use crate::permissions::PermissionSet;
use crate::skills::builtin::{CodegenSkill, RunCommandSkill, WebSearchSkill};
use crate::skills::SkillRegistry;

/// How long a connection must be up before we consider it "stable"
/// and reset the backoff to initial values.
const STABILITY_THRESHOLD: Duration = Duration::from_secs(60);

/// Maximum consecutive transient failures before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 20;

fn print_help() {
    println!(
        "\
opsgate v{}

A chat-ops agent that runs whitelisted shell commands through a
hardened security gateway.

USAGE:
    opsgate [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/opsgate.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG              Log level filter for tracing
                          (e.g. debug, opsgate=debug,warn)
    ANTHROPIC_API_KEY     API key for Anthropic Claude models
                          (from https://console.anthropic.com/)
    OPENAI_API_KEY        API key for OpenAI-compatible models
    CHAT_ACCESS_TOKEN     Bearer token for the chat gateway
    TAVILY_API_KEY        API key for Tavily web search
                          (from https://tavily.com)
    PERPLEXITY_API_KEY    API key for Perplexity Sonar search
                          (from https://perplexity.ai)

EXAMPLES:
    opsgate                            # uses config/opsgate.toml
    opsgate /etc/opsgate/agent.toml    # custom config path
    RUST_LOG=debug opsgate             # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("opsgate v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("opsgate=info")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/opsgate.toml".to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;

    info!("Agent: {}", config.agent.name);
    info!("Chat gateway: {}", config.chat.url);
    info!("LLM: {} ({})", config.llm.provider, config.llm.model);
    info!("Allowed actors: {}", config.agent.allowed_actors.join(", "));

    // The command gateway compiles its policy up front; a bad pattern or
    // limit aborts startup here.
    let command_gateway = Arc::new(
        CommandGateway::new(&config.gateway).map_err(|e| anyhow!("gateway config: {e}"))?,
    );
    if config.gateway.enabled {
        info!(
            "Command gateway: enabled ({} whitelisted commands, {} blocked patterns)",
            config.gateway.allowed_commands.len(),
            config.gateway.blocked_patterns.len()
        );
    } else {
        info!("Command gateway: disabled");
    }

    let permissions = Arc::new(PermissionSet::new(&config.permissions));
    let llm: Arc<dyn LlmClient> = Arc::from(llm::new_client(&config.llm)?);

    // Register builtin skills based on config
    let mut registry = SkillRegistry::new();
    registry.register(Box::new(RunCommandSkill::new(
        command_gateway.clone(),
        permissions.clone(),
    )));

    if let Some(ref search_config) = config.skills.web_search {
        info!(
            "Registering builtin skill: web_search (provider: {})",
            search_config.provider
        );
        let summarizer = search_config.summarize_results.then(|| llm.clone());
        registry.register(Box::new(WebSearchSkill::new(search_config, summarizer)?));
    }

    if let Some(ref codegen_config) = config.skills.codegen {
        info!("Registering builtin skill: codegen");
        registry.register(Box::new(CodegenSkill::new(
            codegen_config.clone(),
            llm.clone(),
            permissions.clone(),
        )));
    }

    info!("Skills: {} registered", registry.len());
    let runtime = AgentRuntime::new(config.clone(), llm, Arc::new(registry));

    let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(60), 2);

    // ── Reconnection loop ──────────────────────────────────────────
    loop {
        info!(
            "Connecting to chat gateway (attempt {})...",
            backoff.attempt() + 1
        );

        match chat::connect(config.chat.clone()).await {
            Ok((event_rx, cmd_tx)) => {
                let connected_at = Instant::now();

                // Run the agent runtime until the connection drops
                tokio::select! {
                    result = runtime.run(event_rx, cmd_tx) => {
                        if let Err(e) = result {
                            error!("Runtime error: {e}");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received, exiting");
                        return Ok(());
                    }
                }

                // Reset backoff if the connection was stable (up long enough)
                if connected_at.elapsed() >= STABILITY_THRESHOLD {
                    backoff.reset();
                    info!("Connection was stable, backoff reset");
                } else {
                    warn!(
                        "Connection lasted only {}s",
                        connected_at.elapsed().as_secs()
                    );
                }

                warn!("Chat connection lost, preparing to reconnect...");
            }
            Err(e) => {
                // Permanent errors — exit immediately
                if !e.is_retriable() {
                    error!("Permanent connection error: {e}");
                    return Err(anyhow!("Cannot connect: {e}"));
                }

                warn!("Connection failed: {e}");

                if backoff.is_exhausted(MAX_RECONNECT_ATTEMPTS) {
                    error!(
                        "Exceeded {} reconnection attempts, giving up",
                        MAX_RECONNECT_ATTEMPTS
                    );
                    return Err(anyhow!(
                        "Max reconnection attempts ({MAX_RECONNECT_ATTEMPTS}) exceeded"
                    ));
                }
            }
        }

        // Wait before retrying, but allow graceful shutdown during the wait
        let delay = backoff.next_delay();
        info!(
            "Reconnecting in {}s (attempt {})...",
            delay.as_secs(),
            backoff.attempt() + 1
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received during backoff, exiting");
                return Ok(());
            }
        }
    }
}

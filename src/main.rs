//! roster-tokens: one custom token per roster member, kept in sync.
//!
//! Subcommands:
//! - `sync` (default): reconcile the registry with the roster
//! - `list`: post the token listing of each container to its channel
//! - `status`: summarize the persisted snapshot

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roster_tokens::{
    listing, Config, ConfigError, EngineConfig, HttpAppearanceFetcher, HttpRegistryClient, HttpRosterSource,
    JsonFileStore, Reconciler, RetryPolicy, StateStore, SyncError, TracingReporter,
};

#[derive(Parser)]
#[command(name = "roster-tokens")]
#[command(about = "Keeps a capacity-limited token registry in sync with an identity roster")]
struct Cli {
    /// Path to configuration file (.toml or .json)
    #[arg(short, long, default_value = "roster-tokens.toml")]
    config: PathBuf,

    /// Directory holding the snapshot documents (overrides config file)
    #[arg(long, env = "ROSTER_TOKENS_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Registry bot token (overrides config file)
    #[arg(long, env = "ROSTER_TOKENS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the registry with the roster
    Sync,
    /// Post the token listing of every container to its channel
    List,
    /// Print snapshot counts
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roster_tokens=info".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config, SyncError> {
    let mut config = Config::load(&cli.config)?;
    if !cli.config.exists() {
        warn!("Config file {} not found, using defaults", cli.config.display());
    }

    if let Some(state_dir) = &cli.state_dir {
        config.sync.state_dir = state_dir.clone();
    }
    if let Some(token) = &cli.token {
        config.registry.token = token.clone();
    }
    Ok(config)
}

fn registry_client(config: &Config) -> Result<HttpRegistryClient, SyncError> {
    HttpRegistryClient::new(
        &config.registry.api_base,
        &config.registry.token,
        config.registry.capacity,
        Duration::from_secs(config.registry.timeout_secs),
    )
    .map_err(|e| SyncError::Config(ConfigError::Client(e.to_string())))
}

async fn sync(config: &Config) -> Result<(), SyncError> {
    config.validate()?;

    let timeout = Duration::from_secs(config.registry.timeout_secs);
    let roster = HttpRosterSource::new(&config.roster.api_base, timeout)?;
    let appearance = HttpAppearanceFetcher::new(
        &config.appearance.api_base,
        config.appearance.cache_dir.clone(),
        RetryPolicy::new(
            config.appearance.max_attempts,
            Duration::from_millis(config.appearance.backoff_ms),
        ),
        timeout,
    )?;

    let engine = Reconciler::new(
        Arc::new(registry_client(config)?),
        Arc::new(appearance),
        Arc::new(JsonFileStore::new(config.sync.state_dir.clone())),
        Arc::new(TracingReporter),
    )
    .with_config(EngineConfig::from(&config.sync));

    let outcome = engine
        .run(&roster, &config.roster.groups, &config.registry.container_ids)
        .await?;

    for w in &outcome.warnings {
        warn!(
            identity = %w.identity,
            token = %w.token,
            "Local and remote state may differ: {:?} failed ({})",
            w.op,
            w.message
        );
    }
    for slot in outcome.containers.slots() {
        info!(container = %slot.id, used = slot.used, capacity = slot.capacity, "Container occupancy");
    }
    info!(free = outcome.containers.remaining(), "Free slots across containers");
    Ok(())
}

async fn list(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let registry = registry_client(config)?;
    let posted = listing::broadcast(&registry, config).await?;
    info!("Posted {} listing messages", posted);
    Ok(())
}

fn status(config: &Config) -> Result<(), SyncError> {
    let store = JsonFileStore::new(config.sync.state_dir.clone());
    let snapshot = store.load()?;

    println!("State dir:         {}", store.dir().display());
    println!("Display names:     {}", snapshot.display_names.len());
    println!("Fingerprints:      {}", snapshot.fingerprints.len());
    println!("Token assignments: {}", snapshot.token_assignments.len());
    println!("Token containers:  {}", snapshot.token_containers.len());
    println!(
        "Consistent:        {}",
        if snapshot.is_consistent() { "yes" } else { "no" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    match cli.command.unwrap_or(Command::Sync) {
        Command::Sync => {
            info!("Starting reconciliation");
            if let Err(e) = sync(&config).await {
                error!(exit_code = e.exit_code(), "Run aborted: {}", e);
                std::process::exit(e.exit_code());
            }
        }
        Command::List => {
            if let Err(e) = list(&config).await {
                error!("Listing failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Command::Status => {
            if let Err(e) = status(&config) {
                eprintln!("Error: {}", e);
                std::process::exit(e.exit_code());
            }
        }
    }

    Ok(())
}

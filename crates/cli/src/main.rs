mod config_commands;
mod db_commands;
mod run;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    mqtg_config::MqtgConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "mqtg", about = "mqtg, an MQTT to Telegram bridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: ./mqtg.toml, then ~/.config/mqtg/mqtg.toml).
    #[arg(long, global = true, env = "MQTG_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL (overrides config value).
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default when no subcommand is provided).
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Discover the config and apply command-line overrides.
fn load_config(cli: &Cli) -> mqtg_config::Result<MqtgConfig> {
    let mut config = mqtg_config::discover_and_load(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "mqtg starting");

    match &cli.command {
        None | Some(Commands::Run) => run::run_bridge(load_config(&cli)?).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, load_config(&cli)).await
        },
        Some(Commands::Db { action }) => db_commands::handle_db(action, &load_config(&cli)?).await,
    }
}

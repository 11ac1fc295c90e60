use std::net::SocketAddr;

use clap::Parser;
use staking_service::{build_router, ServiceConfig, ServiceState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "stakingd", version, about = "Stake-and-slash reservation ledger service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "STAKING_CONFIG")]
    config: Option<String>,

    /// REST socket address to bind, e.g. 127.0.0.1:8095
    #[arg(short, long, env = "STAKING_LISTEN_ADDR")]
    listen: Option<SocketAddr>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "STAKING_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "STAKING_LOG_JSON")]
    json: bool,

    /// Accept every stake proof (local development only)
    #[arg(long, default_value_t = false)]
    accept_all_identities: bool,

    /// Expose the custody mint/approve routes
    #[arg(long, default_value_t = false)]
    dev_custody: bool,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    if cli.accept_all_identities {
        config.identity.mode = staking_service::IdentityMode::AcceptAll;
    }
    config.server.dev_custody |= cli.dev_custody;

    init_tracing(&config.logging.level, config.logging.json);

    let state = ServiceState::bootstrap(&config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!(
        owner = %config.ledger.owner,
        identity = ?config.identity.mode,
        "staking-service REST listening on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}

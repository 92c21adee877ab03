//! Multiplayer Texas Hold'em server.
//!
//! Wires the core registries (tables, tournaments, lobbies, profiles) into
//! an axum HTTP/WebSocket app, plus a periodic sweeper for expired lobbies
//! and empty tables.

mod api;
mod config;
mod logging;
mod metrics;

use anyhow::Error;
use config::ServerConfig;
use pico_args::Arguments;
use poker_core::lobby::LobbyRegistry;
use poker_core::profile::ProfileRegistry;
use poker_core::table::TableManager;
use poker_core::tournament::TournamentManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const HELP: &str = "\
Run the multiplayer Texas Hold'em server

USAGE:
  poker_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND, or 0.0.0.0:$PORT, or 127.0.0.1:8000]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  PORT                     Port shorthand used when SERVER_BIND is unset
  METRICS_BIND             Prometheus scrape address; unset disables metrics
  TELEGRAM_TOKEN           Bot token used to verify signed init data
  BOT_USERNAME             Bot username (informational)
  WEBAPP_URL               Web app URL handed to clients
  PRODUCTION               Any truthy value requires TELEGRAM_TOKEN
  RUST_LOG                 Log filter (default: info)
";

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;

    logging::init();

    let config = ServerConfig::from_env(bind_override)?;
    config.validate()?;
    info!("starting poker server at {}", config.bind);

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init(metrics_bind).map_err(Error::msg)?;
        info!("metrics exposed at {metrics_bind}");
    }
    if config.telegram_token.is_none() {
        info!("TELEGRAM_TOKEN not set; only guest identities will verify");
    }

    let state = api::AppState {
        config: Arc::new(config.clone()),
        tables: Arc::new(TableManager::new()),
        tournaments: TournamentManager::new(),
        lobbies: Arc::new(LobbyRegistry::new()),
        profiles: Arc::new(ProfileRegistry::new()),
        lobby_rooms: Arc::new(api::websocket::LobbyRooms::new()),
    };

    // Periodic sweep: expired lobbies, empty tables, gauge refresh.
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                state.lobbies.cleanup_expired().await;
                state.tables.prune_empty().await;
                metrics::active_tables(state.tables.table_count().await);
                metrics::tournaments_total(state.tournaments.tournament_count().await);
            }
        });
    }

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {}: {}", config.bind, e))?;

    info!("server is running at http://{}. Press Ctrl+C to stop.", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}

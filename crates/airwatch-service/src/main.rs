//! AirWatch Service - HTTP ingestion and REST API.
//!
//! Run with: `cargo run -p airwatch-service`

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use airwatch_core::{DeviceStore, ForecastInput, SqliteDeviceStore, SyntheticHistory};
use airwatch_service::{AppState, Config, api, state, ws};

/// AirWatch Service - HTTP ingestion and REST API.
#[derive(Parser, Debug)]
#[command(name = "airwatch-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Validate the configuration and exit.
    CheckConfig,

    /// Request a breach forecast over a synthetic trend.
    Forecast {
        /// Zone to forecast for.
        #[arg(long, default_value = "Zone A - Atrium")]
        zone: String,

        /// Alert threshold in ppm.
        #[arg(long, default_value_t = 35.0)]
        threshold: f64,

        /// Mean CO level of the synthetic trend.
        #[arg(long, default_value_t = 5.0)]
        base: f64,

        /// Peak-to-peak spread of the synthetic trend.
        #[arg(long, default_value_t = 3.0)]
        variation: f64,

        /// Number of one-minute samples.
        #[arg(long, default_value_t = 60)]
        points: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airwatch_service=info".parse()?)
                .add_directive("airwatch_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::CheckConfig) => {
            config.validate()?;
            println!("Configuration is valid");
            Ok(())
        }
        Some(Command::Forecast {
            zone,
            threshold,
            base,
            variation,
            points,
        }) => {
            let history = SyntheticHistory::new(base, variation, points);
            run_forecast(&config, zone, threshold, history).await
        }
        Some(Command::Run) | None => run_server(config).await,
    }
}

/// Load configuration and apply environment and CLI overrides.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Using default configuration: {}", e);
            Config::default()
        }),
    };

    config.apply_env();

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    Ok(config)
}

async fn run_forecast(
    config: &Config,
    zone: String,
    threshold: f64,
    history: SyntheticHistory,
) -> anyhow::Result<()> {
    let gateway = state::forecast_gateway(&config.forecast);
    let now = OffsetDateTime::now_utc();
    let input = ForecastInput::from_history(zone, &history.generate(now), now, threshold)?;

    let output = gateway.predict(&input).await?;
    println!(
        "Breach probability: {:.0}% ({:?})",
        output.percent(),
        output.risk()
    );
    println!("{}", output.explanation);
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    info!("Opening database at {:?}", config.storage.path);
    let store = SqliteDeviceStore::open(&config.storage.path)?;
    let installed = store
        .with_store(|store| store.install_default_alert_rules())
        .await?;
    if installed > 0 {
        info!("Installed {} default alert rules", installed);
    }

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config);

    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state.clone());

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    state.store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

//! Application state shared across handlers.
//!
//! # Subscriber Queues
//!
//! Each WebSocket client owns one [`DeviceSubscription`](airwatch_core::DeviceSubscription)
//! whose event queue holds `server.broadcast_buffer` events. Snapshots are
//! full collections, so a slow client never needs the intermediate ones: the
//! store's watch coalesces them and the client receives the newest.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! broadcast_buffer = 32
//! ```

use std::sync::Arc;

use airwatch_core::{DeviceSync, ForecastGateway, GeminiModel, SqliteDeviceStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{Config, ForecastConfig};

/// Shared application state.
pub struct AppState {
    /// The device store.
    pub store: Arc<SqliteDeviceStore>,
    /// Snapshot subscriptions with seed-on-empty.
    pub sync: DeviceSync<SqliteDeviceStore>,
    /// Breach forecasting.
    pub forecast: ForecastGateway,
    /// Configuration.
    pub config: RwLock<Config>,
}

impl AppState {
    /// Create new application state.
    ///
    /// The forecast gateway is left unconfigured when no API key is set;
    /// forecast requests then fail with 503.
    pub fn new(store: SqliteDeviceStore, config: Config) -> Arc<Self> {
        let forecast = forecast_gateway(&config.forecast);
        Self::with_forecast(store, config, forecast)
    }

    /// Create state with an explicit forecast gateway.
    pub fn with_forecast(
        store: SqliteDeviceStore,
        config: Config,
        forecast: ForecastGateway,
    ) -> Arc<Self> {
        let store = Arc::new(store);
        let sync =
            DeviceSync::new(Arc::clone(&store)).with_buffer(config.server.broadcast_buffer);
        Arc::new(Self {
            store,
            sync,
            forecast,
            config: RwLock::new(config),
        })
    }
}

/// Build the forecast gateway for a configuration.
pub fn forecast_gateway(config: &ForecastConfig) -> ForecastGateway {
    let Some(api_key) = config.api_key.as_deref() else {
        info!("No forecast API key configured, forecasts disabled");
        return ForecastGateway::unconfigured();
    };

    match GeminiModel::with_options(api_key, config.model.as_str(), &config.base_url) {
        Ok(model) => {
            info!("Forecasts enabled with model {}", config.model);
            ForecastGateway::new(Arc::new(model))
        }
        Err(e) => {
            warn!("Forecast model unavailable: {}", e);
            ForecastGateway::unconfigured()
        }
    }
}

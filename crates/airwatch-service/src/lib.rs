//! HTTP ingestion and REST API for AirWatch CO monitoring.
//!
//! This crate provides a service that:
//! - Accepts device readings from field hardware and merges them into the store
//! - Serves the device collection, seeding the defaults when it is empty
//! - Streams collection snapshots over WebSocket
//! - Forwards breach forecast requests to a generative model
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `POST /api/devices` - Ingest a device reading (201 on success)
//! - `GET /api/devices` - List all devices
//! - `GET /api/devices/:id` - Get one device
//! - `PATCH /api/devices/:id` - Partial update of an existing device
//! - `DELETE /api/devices/:id` - Remove a device and its readings
//! - `GET /api/devices/:id/history` - Recorded CO levels, oldest first
//! - `GET /api/summary` - Status counts and overall status
//! - `GET|POST /api/alert-rules`, `PUT|DELETE /api/alert-rules/:id` - Alert rules
//! - `POST /api/forecast` - Breach probability for a zone
//! - `GET /api/client-config` - Keys the dashboard needs
//! - `WS /api/ws` - Real-time device snapshots
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airwatch/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/airwatch/data.db"
//!
//! [forecast]
//! model = "gemini-1.5-flash"
//! ```
//!
//! `GEMINI_API_KEY` and `MAPS_API_KEY` in the environment override the
//! corresponding keys in the file.

pub mod api;
pub mod config;
pub mod ingest;
pub mod state;
pub mod ws;

pub use config::{Config, ConfigError, ForecastConfig, MapsConfig, ServerConfig, StorageConfig};
pub use state::AppState;

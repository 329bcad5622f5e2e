//! REST API endpoints for the airwatch-service.
//!
//! # Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`] with an
//! `error` message and, for validation failures, a `details` list of
//! `{field, message}` entries. Store failures return HTTP 500; forecast model
//! failures return 502.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use airwatch_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info};

use airwatch_core::{BreachRisk, DeviceStore, ForecastOutput};
use airwatch_store::{ReadingQuery, Store};
use airwatch_types::{
    AlertRule, DevicePatch, DeviceSummary, FieldError, HistoricalPoint, OverallStatus,
    SensorDevice,
};

use crate::ingest::parse_ingest;
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/client-config", get(client_config))
        // Devices
        .route("/api/devices", get(list_devices).post(ingest_device))
        .route(
            "/api/devices/{id}",
            get(get_device).patch(patch_device).delete(delete_device),
        )
        .route("/api/devices/{id}/history", get(get_history))
        .route("/api/summary", get(get_summary))
        // Alert rules
        .route("/api/alert-rules", get(list_alert_rules).post(create_alert_rule))
        .route(
            "/api/alert-rules/{id}",
            put(replace_alert_rule).delete(delete_alert_rule),
        )
        // Forecasting
        .route("/api/forecast", post(forecast))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Keys the dashboard needs at runtime.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    pub maps_api_key: Option<String>,
}

async fn client_config(State(state): State<Arc<AppState>>) -> Json<ClientConfigResponse> {
    let config = state.config.read().await;
    Json(ClientConfigResponse {
        maps_api_key: config.maps.api_key.clone(),
    })
}

// ==========================================================================
// Devices
// ==========================================================================

/// Current collection; an empty collection is seeded first.
async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SensorDevice>>, AppError> {
    Ok(Json(state.sync.devices().await?))
}

async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SensorDevice>, AppError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", id)))
}

/// Ingestion acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub id: String,
}

/// Ingest a device reading.
///
/// Responds 201 once the merge-write has completed.
async fn ingest_device(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let value = parse_json(&body)?;
    let patch = parse_ingest(&value, OffsetDateTime::now_utc()).map_err(|details| {
        AppError::Validation {
            message: "Invalid device data".to_string(),
            details,
        }
    })?;

    let device = state.store.upsert(patch).await.map_err(|e| {
        error!("Failed to save ingested device: {}", e);
        AppError::Internal(format!("Failed to process request: {}", e))
    })?;
    info!(
        "Ingested {} (status {}, CO {} ppm)",
        device.id, device.status, device.co_level
    );

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            message: "Device data received and saved successfully".to_string(),
            id: device.id,
        }),
    ))
}

/// Partial merge-write of an existing device.
async fn patch_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SensorDevice>, AppError> {
    let mut value = parse_json(&body)?;
    let Some(object) = value.as_object_mut() else {
        return Err(AppError::BadRequest("Expected a JSON object".to_string()));
    };
    object.insert("id".to_string(), Value::String(id.clone()));

    let patch: DevicePatch = serde_json::from_value(value)
        .map_err(|e| AppError::BadRequest(format!("Invalid device data: {}", e)))?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    if state.store.get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Device not found: {}", id)));
    }

    Ok(Json(state.store.upsert(patch).await?))
}

async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.delete(&id).await? {
        info!("Deleted device {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Device not found: {}", id)))
    }
}

/// Query parameters for reading history.
#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    /// Unix seconds.
    pub since: Option<i64>,
    /// Unix seconds.
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HistoryParams {
    /// Returns an error if a bound is out of range or `since > until`.
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, secs) in [("since", self.since), ("until", self.until)] {
            if let Some(secs) = secs {
                timestamp_param(name, secs)?;
            }
        }
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }
        Ok(())
    }
}

/// Paginated response wrapper with metadata.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Number of items returned.
    pub count: usize,
    pub offset: u32,
    pub limit: Option<u32>,
    /// Whether there are more items available.
    pub has_more: bool,
}

/// Recorded CO levels for a device, oldest first.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<PaginatedResponse<HistoricalPoint>>, AppError> {
    params.validate()?;

    if state.store.get(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Device not found: {}", id)));
    }

    let mut query = ReadingQuery::new().device(&id).oldest_first();
    if let Some(since) = params.since {
        query = query.since(timestamp_param("since", since)?);
    }
    if let Some(until) = params.until {
        query = query.until(timestamp_param("until", until)?);
    }

    // Request one extra item to determine if there are more
    if let Some(limit) = params.limit {
        query = query.limit(limit.saturating_add(1));
    }
    if let Some(offset) = params.offset {
        query = query.offset(offset);
    }

    let mut readings = state
        .store
        .with_store(|store| store.query_readings(&query))
        .await?;

    let has_more = params.limit.is_some_and(|l| readings.len() > l as usize);
    if has_more {
        readings.pop();
    }

    Ok(Json(PaginatedResponse {
        pagination: PaginationMeta {
            count: readings.len(),
            offset: params.offset.unwrap_or(0),
            limit: params.limit,
            has_more,
        },
        data: readings.iter().map(|r| r.to_point()).collect(),
    }))
}

/// Status counts and the banner status.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: DeviceSummary,
    pub overall: OverallStatus,
    pub total: usize,
}

async fn get_summary(State(state): State<Arc<AppState>>) -> Result<Json<SummaryResponse>, AppError> {
    let devices = state.sync.devices().await?;
    let summary = DeviceSummary::from_devices(&devices);
    Ok(Json(SummaryResponse {
        total: summary.total(),
        summary,
        overall: OverallStatus::from_devices(&devices),
    }))
}

// ==========================================================================
// Alert rules
// ==========================================================================

async fn list_alert_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AlertRule>>, AppError> {
    Ok(Json(state.store.with_store(Store::list_alert_rules).await?))
}

/// Body for creating a rule. A missing ID is generated.
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub id: Option<String>,
    pub name: String,
    pub threshold: f64,
    pub timeframe: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Body for replacing a rule.
#[derive(Debug, Deserialize)]
pub struct ReplaceRuleRequest {
    pub name: String,
    pub threshold: f64,
    pub timeframe: u32,
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

async fn create_alert_rule(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: CreateRuleRequest = parse_body(&body, "Invalid alert rule")?;
    let rule = AlertRule {
        id: request.id.unwrap_or_else(AlertRule::generate_id),
        name: request.name,
        threshold: request.threshold,
        timeframe: request.timeframe,
        enabled: request.enabled,
    };

    let created = state
        .store
        .with_store(|store| {
            if store.get_alert_rule(&rule.id)?.is_some() {
                return Ok(false);
            }
            store.upsert_alert_rule(&rule)?;
            Ok(true)
        })
        .await?;

    if !created {
        return Err(AppError::Conflict(format!(
            "Alert rule already exists: {}",
            rule.id
        )));
    }

    info!("Created alert rule {} ({})", rule.id, rule.describe());
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn replace_alert_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AlertRule>, AppError> {
    let request: ReplaceRuleRequest = parse_body(&body, "Invalid alert rule")?;
    let rule = AlertRule {
        id,
        name: request.name,
        threshold: request.threshold,
        timeframe: request.timeframe,
        enabled: request.enabled,
    };

    let replaced = state
        .store
        .with_store(|store| {
            if store.get_alert_rule(&rule.id)?.is_none() {
                return Ok(false);
            }
            store.upsert_alert_rule(&rule)?;
            Ok(true)
        })
        .await?;

    if replaced {
        Ok(Json(rule))
    } else {
        Err(AppError::NotFound(format!("Alert rule not found: {}", rule.id)))
    }
}

async fn delete_alert_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state
        .store
        .with_store(|store| store.delete_alert_rule(&id))
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Alert rule not found: {}", id)))
    }
}

// ==========================================================================
// Forecasting
// ==========================================================================

/// Forecast result with its display bucket.
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    #[serde(flatten)]
    pub output: ForecastOutput,
    pub risk: BreachRisk,
}

async fn forecast(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ForecastResponse>, AppError> {
    let value = parse_json(&body)?;
    let output = state.forecast.predict_value(&value).await.map_err(|e| match e {
        airwatch_core::Error::Transport(msg) | airwatch_core::Error::Schema(msg) => {
            error!("Forecast failed: {}", msg);
            AppError::BadGateway(format!("Forecast failed: {}", msg))
        }
        other => other.into(),
    })?;

    Ok(Json(ForecastResponse {
        risk: output.risk(),
        output,
    }))
}

fn parse_json(body: &[u8]) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|_| AppError::BadRequest("Invalid JSON body".to_string()))
}

/// Parse a typed request body, reporting shape errors under `context`.
fn parse_body<T: DeserializeOwned>(body: &[u8], context: &str) -> Result<T, AppError> {
    serde_json::from_value(parse_json(body)?)
        .map_err(|e| AppError::BadRequest(format!("{}: {}", context, e)))
}

/// Convert a unix-seconds query parameter.
fn timestamp_param(name: &str, secs: i64) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|_| AppError::BadRequest(format!("Invalid '{}' timestamp: {}", name, secs)))
}

// ==========================================================================
// Errors
// ==========================================================================

/// API error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
    Conflict(String),
    BadGateway(String),
    Unavailable(String),
    Internal(String),
}

impl From<airwatch_core::Error> for AppError {
    fn from(e: airwatch_core::Error) -> Self {
        use airwatch_core::Error;

        match e {
            Error::Validation(details) => AppError::Validation {
                message: "Validation failed".to_string(),
                details,
            },
            Error::IncompleteDevice { id, missing } => AppError::Validation {
                message: format!("Device {} does not exist and the write is incomplete", id),
                details: missing
                    .into_iter()
                    .map(|field| FieldError::new(field, "is required"))
                    .collect(),
            },
            Error::NotFound(id) => AppError::NotFound(format!("Device not found: {}", id)),
            Error::NotConfigured(msg) => AppError::Unavailable(msg),
            Error::Closed => AppError::Unavailable(Error::Closed.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            AppError::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": message, "details": details }),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({ "error": msg })),
            AppError::BadGateway(msg) => {
                (StatusCode::BAD_GATEWAY, serde_json::json!({ "error": msg }))
            }
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": msg }),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use airwatch_core::{ForecastGateway, ForecastModel, GeminiModel, SqliteDeviceStore};

    use crate::config::Config;

    struct CannedModel(&'static str);

    #[async_trait]
    impl ForecastModel for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _prompt: &str) -> airwatch_core::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn create_test_state() -> Arc<AppState> {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        AppState::new(store, Config::default())
    }

    fn create_forecast_state(reply: &'static str) -> Arc<AppState> {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let gateway = ForecastGateway::new(Arc::new(CannedModel(reply)));
        AppState::with_forecast(store, Config::default(), gateway)
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn send(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router()
            .with_state(Arc::clone(state))
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let text = response_body(response).await;
        let json = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap()
        };
        (status, json)
    }

    fn ingest_body(id: &str, co_level: f64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": "Loading Dock Sensor",
            "location": { "lat": 40.7150, "lng": -74.0070, "name": "Zone F - Loading Dock" },
            "status": "Normal",
            "battery": 77,
            "coLevel": co_level,
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state();
        let (status, json) = send(&state, "GET", "/api/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_list_devices_seeds_empty_collection() {
        let state = create_test_state();
        let (status, json) = send(&state, "GET", "/api/devices", None).await;

        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["SN-001", "SN-002", "SN-003", "SN-004", "SN-005"]);
        assert_eq!(json[1]["coLevel"], 12.0);
        assert_eq!(json[1]["location"]["name"], "Zone B - Cafeteria");
    }

    #[tokio::test]
    async fn test_ingest_creates_device() {
        let state = create_test_state();
        let (status, json) =
            send(&state, "POST", "/api/devices", Some(ingest_body("SN-006", 4.5))).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["id"], "SN-006");
        assert_eq!(json["message"], "Device data received and saved successfully");

        let (status, json) = send(&state, "GET", "/api/devices/SN-006", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["battery"], 77);
        assert_eq!(json["coLevel"], 4.5);
        assert!(json["lastReading"].is_string());
    }

    #[tokio::test]
    async fn test_ingest_invalid_json() {
        let state = create_test_state();
        let response = router()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/devices")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value =
            serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_ingest_reports_field_errors() {
        let state = create_test_state();
        let body = serde_json::json!({ "id": "SN-006", "battery": 150 });
        let (status, json) = send(&state, "POST", "/api/devices", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid device data");
        let fields: Vec<&str> = json["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"battery"));
        assert!(fields.contains(&"coLevel"));

        // Nothing was written
        let (status, _) = send(&state, "GET", "/api/devices/SN-006", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_unknown_device() {
        let state = create_test_state();
        let (status, json) = send(&state, "GET", "/api/devices/SN-404", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("SN-404"));
    }

    #[tokio::test]
    async fn test_patch_merges_fields() {
        let state = create_test_state();
        send(&state, "GET", "/api/devices", None).await;

        let body = serde_json::json!({ "battery": 10, "location": { "name": "Zone C - Lab 2B" } });
        let (status, json) = send(&state, "PATCH", "/api/devices/SN-003", Some(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["battery"], 10);
        assert_eq!(json["name"], "Lab 2 Exhaust");
        assert_eq!(json["location"]["name"], "Zone C - Lab 2B");
        assert_eq!(json["location"]["lat"], 40.7140);
    }

    #[tokio::test]
    async fn test_patch_unknown_device() {
        let state = create_test_state();
        let body = serde_json::json!({ "battery": 10 });
        let (status, _) = send(&state, "PATCH", "/api/devices/SN-404", Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_without_fields() {
        let state = create_test_state();
        send(&state, "GET", "/api/devices", None).await;

        let (status, _) =
            send(&state, "PATCH", "/api/devices/SN-001", Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_device() {
        let state = create_test_state();
        send(&state, "GET", "/api/devices", None).await;

        let (status, _) = send(&state, "DELETE", "/api/devices/SN-003", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&state, "DELETE", "/api/devices/SN-003", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = send(&state, "GET", "/api/devices", None).await;
        assert_eq!(json.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let state = create_test_state();
        for level in [1.0, 2.0, 3.0] {
            let (status, _) =
                send(&state, "POST", "/api/devices", Some(ingest_body("SN-006", level))).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, json) = send(&state, "GET", "/api/devices/SN-006/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pagination"]["count"], 3);
        assert_eq!(json["pagination"]["has_more"], false);

        let (_, json) = send(&state, "GET", "/api/devices/SN-006/history?limit=2", None).await;
        assert_eq!(json["pagination"]["count"], 2);
        assert_eq!(json["pagination"]["has_more"], true);
        assert_eq!(json["data"][0]["coLevel"], 1.0);
        assert_eq!(json["data"][1]["coLevel"], 2.0);
    }

    #[tokio::test]
    async fn test_history_invalid_range() {
        let state = create_test_state();
        send(&state, "POST", "/api/devices", Some(ingest_body("SN-006", 1.0))).await;

        let (status, json) = send(
            &state,
            "GET",
            "/api/devices/SN-006/history?since=2000&until=1000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid time range"));
    }

    #[tokio::test]
    async fn test_history_out_of_range_timestamp() {
        let state = create_test_state();
        send(&state, "POST", "/api/devices", Some(ingest_body("SN-006", 1.0))).await;

        let (status, json) = send(
            &state,
            "GET",
            "/api/devices/SN-006/history?since=999999999999999",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("'since'"));
    }

    #[test]
    fn test_history_params_validate() {
        let ok = HistoryParams {
            since: Some(1000),
            until: Some(2000),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = HistoryParams {
            until: Some(i64::MIN),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_history_of_seeded_device() {
        let state = create_test_state();
        send(&state, "GET", "/api/devices", None).await;

        let (status, json) = send(&state, "GET", "/api/devices/SN-003/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pagination"]["count"], 1);
        assert_eq!(json["data"][0]["coLevel"], 55.0);
    }

    #[tokio::test]
    async fn test_history_unknown_device() {
        let state = create_test_state();
        let (status, _) = send(&state, "GET", "/api/devices/SN-404/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary() {
        let state = create_test_state();
        let (status, json) = send(&state, "GET", "/api/summary", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 5);
        assert_eq!(json["summary"]["critical"], 1);
        assert_eq!(json["overall"]["status"], "Critical");
    }

    #[tokio::test]
    async fn test_alert_rule_lifecycle() {
        let state = create_test_state();

        let body = serde_json::json!({ "name": "Lab spike", "threshold": 30.0, "timeframe": 5 });
        let (status, json) = send(&state, "POST", "/api/alert-rules", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("RULE-"));
        assert_eq!(json["enabled"], true);

        let body = serde_json::json!({ "id": id, "name": "Dup", "threshold": 1.0, "timeframe": 1 });
        let (status, _) = send(&state, "POST", "/api/alert-rules", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let body = serde_json::json!({
            "name": "Lab spike", "threshold": 25.0, "timeframe": 10, "enabled": false
        });
        let uri = format!("/api/alert-rules/{}", id);
        let (status, json) = send(&state, "PUT", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["threshold"], 25.0);
        assert_eq!(json["enabled"], false);

        let (status, _) = send(&state, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&state, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alert_rule_body_errors_are_json() {
        let state = create_test_state();

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/alert-rules")
                    .header("content-type", "application/json")
                    .body(Body::from("{bad"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value =
            serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json["error"], "Invalid JSON body");

        let body = serde_json::json!({ "name": "x" });
        let (status, json) = send(&state, "POST", "/api/alert-rules", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("threshold"));

        let body = serde_json::json!({ "name": "x", "threshold": 5.0 });
        let (status, json) = send(&state, "PUT", "/api/alert-rules/RULE-01", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Invalid alert rule"));
    }

    #[tokio::test]
    async fn test_replace_unknown_rule() {
        let state = create_test_state();
        let body = serde_json::json!({
            "name": "Ghost", "threshold": 25.0, "timeframe": 10, "enabled": true
        });
        let (status, _) = send(&state, "PUT", "/api/alert-rules/RULE-404", Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn forecast_body() -> serde_json::Value {
        serde_json::json!({
            "zoneId": "Zone C - Lab 2",
            "historicalCO2Data": "[{\"timestamp\":\"2025-01-01T12:00:00Z\",\"coLevel\":30.0}]",
            "currentTime": "2025-01-01T12:05:00Z",
            "alertThreshold": 35.0,
        })
    }

    #[tokio::test]
    async fn test_forecast_success() {
        let state =
            create_forecast_state(r#"{"breachProbability": 0.82, "explanation": "Rising fast"}"#);
        let (status, json) = send(&state, "POST", "/api/forecast", Some(forecast_body())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["breachProbability"], 0.82);
        assert_eq!(json["explanation"], "Rising fast");
        assert_eq!(json["risk"], "high");
    }

    #[tokio::test]
    async fn test_forecast_bad_model_reply() {
        let state = create_forecast_state(r#"{"breachProbability": 1.7, "explanation": "?"}"#);
        let (status, _) = send(&state, "POST", "/api/forecast", Some(forecast_body())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_forecast_invalid_input() {
        let state = create_forecast_state(r#"{"breachProbability": 0.1, "explanation": "ok"}"#);
        let body = serde_json::json!({ "zoneId": "Zone A", "historicalCO2Data": "[]" });
        let (status, json) = send(&state, "POST", "/api/forecast", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = json["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["currentTime", "alertThreshold"]);
    }

    #[tokio::test]
    async fn test_forecast_transport_error_hides_api_key() {
        let store = SqliteDeviceStore::open_in_memory().unwrap();
        let model =
            GeminiModel::with_options("SECRET-KEY-1234", "gemini-1.5-flash", "http://127.0.0.1:1")
                .unwrap();
        let gateway = ForecastGateway::new(Arc::new(model));
        let state = AppState::with_forecast(store, Config::default(), gateway);

        let (status, json) = send(&state, "POST", "/api/forecast", Some(forecast_body())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let message = json["error"].as_str().unwrap();
        assert!(message.starts_with("Forecast failed"));
        assert!(!message.contains("SECRET-KEY-1234"));
    }

    #[tokio::test]
    async fn test_forecast_unconfigured() {
        let state = create_test_state();
        let (status, _) = send(&state, "POST", "/api/forecast", Some(forecast_body())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_client_config() {
        let state = create_test_state();
        state.config.write().await.maps.api_key = Some("maps-key".to_string());

        let (status, json) = send(&state, "GET", "/api/client-config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mapsApiKey"], "maps-key");
    }
}

//! Trygr HTTP API
//!
//! A thin axum layer over the trigger store, the trigger engine and the
//! device and location caches.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use trygr_automation::{TriggerEngine, TriggerError, TriggerStore};
use trygr_core::{Device, Location, TriggerDefinition, TriggerEntry};
use trygr_device_cache::{CacheError, DeviceCache, LocationCache};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: TriggerEngine,
    pub triggers: Arc<TriggerStore>,
    pub devices: Arc<DeviceCache>,
    pub locations: Arc<LocationCache>,
}

impl AppState {
    pub fn new(engine: TriggerEngine, locations: Arc<LocationCache>) -> Self {
        Self {
            triggers: engine.store().clone(),
            devices: engine.devices().clone(),
            engine,
            locations,
        }
    }
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

impl From<TriggerError> for ErrorResponse {
    fn from(e: TriggerError) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

fn trigger_error(e: TriggerError) -> ApiError {
    let status = match e {
        TriggerError::Validation(_) => StatusCode::BAD_REQUEST,
        TriggerError::Storage(_) => {
            error!(error = %e, "Trigger storage failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(e.into()))
}

fn cache_error(e: CacheError) -> ApiError {
    let status = match e {
        CacheError::NotFound(_) | CacheError::Stale { .. } => StatusCode::NOT_FOUND,
        CacheError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
        CacheError::Storage(_) => {
            error!(error = %e, "Device storage failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchResponse {
    pass_id: String,
    hits: usize,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/triggers", get(list_triggers))
        .route("/triggers", post(create_trigger))
        .route("/triggers/:id", delete(delete_trigger))
        .route(
            "/triggers/temperature/:temperature",
            get(get_temperature_hits).post(trigger_by_temperature),
        )
        .route("/devices", put(upsert_device))
        .route("/devices/:id", get(get_device))
        .route("/locations/:postal_code", get(get_location))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: AppState, addr: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router).await
}

/// Serve until `shutdown` resolves
pub async fn start_server_with_shutdown(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ==================== Handlers ====================

/// GET /api/health
async fn health_check() -> &'static str {
    "OK"
}

/// GET /triggers
async fn list_triggers(State(state): State<AppState>) -> Json<Vec<TriggerEntry>> {
    Json(state.triggers.list())
}

/// POST /triggers
async fn create_trigger(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let id = state
        .triggers
        .create_from_value(&body)
        .await
        .map_err(trigger_error)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// DELETE /triggers/:id
async fn delete_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.triggers.delete(&id).await.map_err(trigger_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_temperature(raw: &str) -> Result<f64, ApiError> {
    raw.parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("temperature must be a number, got '{}'", raw),
            )
        })
}

/// GET /triggers/temperature/:temperature
async fn get_temperature_hits(
    State(state): State<AppState>,
    Path(temperature): Path<String>,
) -> Result<Json<Vec<TriggerDefinition>>, ApiError> {
    let temperature = parse_temperature(&temperature)?;
    Ok(Json(state.engine.get_temperature_hits(temperature)))
}

/// POST /triggers/temperature/:temperature
///
/// Responds once dispatch has started; outcomes only reach the log.
async fn trigger_by_temperature(
    State(state): State<AppState>,
    Path(temperature): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let temperature = parse_temperature(&temperature)?;
    let dispatch = state.engine.trigger_by_temperature(temperature);
    Ok((
        StatusCode::ACCEPTED,
        Json(DispatchResponse {
            hits: dispatch.hits(),
            pass_id: dispatch.pass_id,
        }),
    ))
}

/// PUT /devices
async fn upsert_device(
    State(state): State<AppState>,
    Json(device): Json<Device>,
) -> Result<StatusCode, ApiError> {
    state.devices.upsert(device).await.map_err(cache_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /devices/:id
async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Device>, ApiError> {
    state.devices.get_by_id(&id).map(Json).map_err(cache_error)
}

/// GET /locations/:postal_code
async fn get_location(
    State(state): State<AppState>,
    Path(postal_code): Path<String>,
) -> Result<Json<Location>, ApiError> {
    state
        .locations
        .get_by_postal_code(&postal_code)
        .map(Json)
        .map_err(cache_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;
    use trygr_core::{ActionOutcome, TriggerValue};
    use trygr_notify::LogNotifier;
    use trygr_vendor::{AdapterRegistry, VendorAdapter};

    struct AlwaysApplied;

    #[async_trait]
    impl VendorAdapter for AlwaysApplied {
        fn vendor(&self) -> &str {
            "kasa"
        }

        async fn perform_action(
            &self,
            device: &Device,
            action: &str,
            _action_value: &TriggerValue,
        ) -> ActionOutcome {
            ActionOutcome::applied(format!("{} {}", device.id, action))
        }
    }

    fn create_test_state() -> AppState {
        let adapters = AdapterRegistry::from_adapters([Arc::new(AlwaysApplied) as Arc<dyn VendorAdapter>]);
        let engine = TriggerEngine::new(
            Arc::new(TriggerStore::in_memory()),
            Arc::new(DeviceCache::in_memory()),
            Arc::new(adapters),
            Arc::new(LogNotifier),
        );
        AppState::new(engine, Arc::new(LocationCache::new()))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn min_temp_request() -> Value {
        json!({
            "affectedDeviceId": "D1",
            "triggerType": "minTemp",
            "triggerValue": 40,
            "action": "turnOn",
            "actionValue": 1,
            "notify": ["a@b.com"]
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state());
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_list_delete_trigger() {
        let state = create_test_state();

        let (status, body) =
            send(create_router(state.clone()), "POST", "/triggers", Some(min_temp_request())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(id, "minTemp:000001");

        let (status, body) = send(create_router(state.clone()), "GET", "/triggers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], json!(id));
        assert_eq!(body[0]["data"], min_temp_request());

        let uri = format!("/triggers/{}", id);
        let (status, _) = send(create_router(state.clone()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(create_router(state.clone()), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(create_router(state), "GET", "/triggers", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_invalid_trigger_is_bad_request() {
        let state = create_test_state();
        let mut request = min_temp_request();
        request["action"] = json!("turn on!");

        let (status, body) = send(create_router(state.clone()), "POST", "/triggers", Some(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid trigger"));
        assert!(state.triggers.is_empty());
    }

    #[tokio::test]
    async fn test_temperature_query() {
        let state = create_test_state();
        send(create_router(state.clone()), "POST", "/triggers", Some(min_temp_request())).await;

        let (status, body) =
            send(create_router(state.clone()), "GET", "/triggers/temperature/35", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(create_router(state.clone()), "GET", "/triggers/temperature/50.5", None).await;
        assert_eq!(body, json!([]));

        let (status, _) = send(create_router(state), "GET", "/triggers/temperature/cold", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trigger_by_temperature_is_accepted() {
        let state = create_test_state();
        send(create_router(state.clone()), "POST", "/triggers", Some(min_temp_request())).await;

        let (status, body) =
            send(create_router(state), "POST", "/triggers/temperature/35", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["hits"], json!(1));
        assert!(body["passId"].is_string());
    }

    #[tokio::test]
    async fn test_device_push_and_lookup() {
        let state = create_test_state();

        let (status, _) = send(create_router(state.clone()), "GET", "/devices/D1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let device = json!({ "id": "D1", "name": "Heater", "vendor": "kasa", "status": "off" });
        let (status, _) = send(create_router(state.clone()), "PUT", "/devices", Some(device)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(create_router(state.clone()), "GET", "/devices/D1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["vendor"], json!("kasa"));
        assert!(body["lastUpdated"].as_i64().unwrap() > 0);

        let empty = json!({ "id": "", "vendor": "kasa" });
        let (status, _) = send(create_router(state), "PUT", "/devices", Some(empty)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let (status, body) =
            send(create_router(create_test_state()), "GET", "/locations/99999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].is_string());
    }
}

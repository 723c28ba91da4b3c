// src/api.rs
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::activity::{ActivityEvent, MemoryActivity};
use crate::error::{ConfigurationError, PersistenceError, SourcingError};
use crate::service::SourcingService;
use crate::sniper::SourcingResult;
use crate::stock::{Availability, AvailabilityChecker};
use crate::store::ShortlistRow;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub service: SourcingService,
    /// Buffer behind `GET /api/activity`; the service's sink should feed it.
    pub activity_log: Arc<MemoryActivity>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/sourcing/start", post(start_sourcing))
        .route("/api/sourcing/recent", get(recent_rows))
        .route("/api/activity", get(recent_activity))
        .route("/api/stock", get(check_stock))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Errors as JSON bodies: `{ "success": false, "error": ..., "code": ... }`.
#[derive(Debug)]
pub enum ApiError {
    Sourcing(SourcingError),
    Configuration(ConfigurationError),
    Persistence(PersistenceError),
    BadRequest(String),
}

impl From<SourcingError> for ApiError {
    fn from(e: SourcingError) -> Self {
        ApiError::Sourcing(e)
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(e: ConfigurationError) -> Self {
        ApiError::Configuration(e)
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        ApiError::Persistence(e)
    }
}

fn configuration_body(e: &ConfigurationError) -> serde_json::Value {
    json!({
        "success": false,
        "code": "CONFIGURATION",
        "error": e.to_string(),
        "keys": e.keys(),
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Sourcing(SourcingError::Configuration(e)) | ApiError::Configuration(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, configuration_body(e))
            }
            ApiError::Sourcing(e @ SourcingError::EmptyKeyword) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "code": "EMPTY_KEYWORD", "error": e.to_string() }),
            ),
            ApiError::Persistence(e) => {
                tracing::warn!(error = %e, "store read failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "code": "PERSISTENCE", "error": e.to_string() }),
                )
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "code": "BAD_REQUEST", "error": msg }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct StartReq {
    #[serde(default)]
    keyword: String,
}

async fn start_sourcing(
    State(state): State<AppState>,
    Json(body): Json<StartReq>,
) -> Result<Json<SourcingResult>, ApiError> {
    let result = state.service.source(&body.keyword).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

async fn recent_rows(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ShortlistRow>>, ApiError> {
    let rows = state.service.store().recent(clamp_limit(q.limit)).await?;
    Ok(Json(rows))
}

async fn recent_activity(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Json<Vec<ActivityEvent>> {
    Json(state.activity_log.recent(clamp_limit(q.limit)))
}

#[derive(Deserialize)]
struct StockQuery {
    url: Option<String>,
}

async fn check_stock(
    State(state): State<AppState>,
    Query(q): Query<StockQuery>,
) -> Result<Json<Availability>, ApiError> {
    let raw = q.url.unwrap_or_default();
    let url = url::Url::parse(raw.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| ApiError::BadRequest("url must be an absolute http(s) URL".to_string()))?;
    let checker = state.service.stock_checker()?;
    Ok(Json(checker.check_availability(url.as_str()).await))
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::constants::{MSG_NO_DATA_LOADED, MSG_UPSTREAM_UNAVAILABLE};
use crate::middleware::rate_limit::{rate_limit_middleware, UpstreamRateLimiter};
use crate::models::adjustment::{
    AdjustmentError, CalculateRequest, CalculateResponse, LoadRequest, LoadResult, LotSummary,
    LotSummaryRequest, SaveRequest, SaveResult, ScanRequest, ScanResponse, UpstreamHealthResponse,
};
use crate::services::AdjustmentService;
use crate::snapshot::LedgerSnapshot;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Create inventory adjustment routes
pub fn create_adjustment_routes(limiter: UpstreamRateLimiter) -> Router<AdjustmentService> {
    let upstream_routes = Router::new()
        .route("/load", post(load))
        .route("/save", post(save))
        .route_layer(from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/calculate", post(calculate))
        .route("/lots/summary", post(summarize_lots))
        .route("/scan", post(scan))
        .route("/health", get(get_health))
        .merge(upstream_routes)
}

fn handle_adjustment_error<T>(error: AdjustmentError) -> Result<T, ApiError> {
    match error {
        AdjustmentError::NoDataLoaded => Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No data loaded",
                "message": MSG_NO_DATA_LOADED
            })),
        )),
        AdjustmentError::ProductNotFound { product_code } => Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Product not found",
                "message": format!("Product '{}' is not in the loaded inventory data", product_code),
                "product_code": product_code
            })),
        )),
        AdjustmentError::ValidationError(msg) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Validation error",
                "message": msg
            })),
        )),
        AdjustmentError::Upstream(msg) => {
            tracing::error!("Pharmacy API error: {msg}");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": MSG_UPSTREAM_UNAVAILABLE,
                    "message": msg
                })),
            ))
        }
        AdjustmentError::UpstreamStatus { status, message } => {
            tracing::error!("Pharmacy API returned HTTP {status}: {message}");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Pharmacy API rejected the request",
                    "message": message,
                    "upstream_status": status
                })),
            ))
        }
    }
}

/// Fetch inventory data and replace the loaded snapshot
/// POST /api/adjustment/load?date={yyyy-mm-dd}
async fn load(
    State(service): State<AdjustmentService>,
    Query(params): Query<LoadRequest>,
) -> Result<Json<LoadResult>, ApiError> {
    match service.load(params.date).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => handle_adjustment_error(e),
    }
}

/// Currently loaded inventory data
/// GET /api/adjustment/snapshot
async fn get_snapshot(
    State(service): State<AdjustmentService>,
) -> Result<Json<LedgerSnapshot>, ApiError> {
    match service.snapshot().await {
        Ok(snapshot) => Ok(Json(LedgerSnapshot::clone(&snapshot))),
        Err(e) => handle_adjustment_error(e),
    }
}

/// Back-calculate previous-day stock for the entered counts
/// POST /api/adjustment/calculate
async fn calculate(
    State(service): State<AdjustmentService>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, ApiError> {
    match service.calculate(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => handle_adjustment_error(e),
    }
}

/// Informational totals for one product's lot rows
/// POST /api/adjustment/lots/summary
async fn summarize_lots(
    State(service): State<AdjustmentService>,
    Json(request): Json<LotSummaryRequest>,
) -> Result<Json<LotSummary>, ApiError> {
    match service.summarize_lots(request).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => handle_adjustment_error(e),
    }
}

/// Decode a scanned pack barcode
/// POST /api/adjustment/scan
async fn scan(
    State(service): State<AdjustmentService>,
    Json(request): Json<ScanRequest>,
) -> Json<ScanResponse> {
    Json(service.scan(&request.barcode).await)
}

/// Forward lot quantities to the pharmacy API
/// POST /api/adjustment/save
async fn save(
    State(service): State<AdjustmentService>,
    Json(request): Json<SaveRequest>,
) -> Result<Json<SaveResult>, ApiError> {
    match service.save(request).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => handle_adjustment_error(e),
    }
}

/// Pharmacy API reachability
/// GET /api/adjustment/health
async fn get_health(State(service): State<AdjustmentService>) -> Json<UpstreamHealthResponse> {
    Json(service.upstream_health().await)
}

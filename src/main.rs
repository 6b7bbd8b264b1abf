use anyhow::{bail, Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod constants;
mod handlers;
mod middleware;
mod models;
mod services;
mod snapshot;
mod upstream;
mod utils;

use handlers::adjustment;
use middleware::rate_limit::upstream_rate_limiter;
use services::AdjustmentService;
use snapshot::SnapshotStore;
use upstream::{InventoryApi, UpstreamClient, UpstreamConfig};

#[derive(Clone)]
pub struct AppState {
    pub static_assets_path: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub message: String,
    pub timestamp: String,
    pub version: String,
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "healthy".to_string(),
        message: "Inventory adjustment backend is running".to_string(),
        timestamp: utils::tokyo_now_rfc3339(),
        version: VERSION.to_string(),
    })
}

/// Serve the adjustment screens: static assets by extension, index.html otherwise
async fn handle_spa_or_static(State(state): State<AppState>, uri: Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    if path.starts_with("api/") {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some(content_type) = static_content_type(path) {
        let Some(file_path) = asset_path(&state.static_assets_path, path) else {
            warn!("🚨 Rejected static path outside assets root: {}", path);
            return StatusCode::NOT_FOUND.into_response();
        };
        if let Ok(content) = tokio::fs::read(&file_path).await {
            return ([(header::CONTENT_TYPE, content_type)], content).into_response();
        }
    }

    serve_index_html(&state.static_assets_path).await.into_response()
}

/// Resolve a request path under the assets root. Only plain segments are allowed.
fn asset_path(root: &str, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path);
    if relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        Some(Path::new(root).join(relative))
    } else {
        None
    }
}

fn static_content_type(path: &str) -> Option<&'static str> {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext)?;
    let content_type = match extension {
        "js" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webmanifest" => "application/manifest+json",
        _ => return None,
    };
    Some(content_type)
}

async fn serve_index_html(static_assets_path: &str) -> impl IntoResponse {
    let index_path = format!("{static_assets_path}/index.html");

    match tokio::fs::read_to_string(&index_path).await {
        Ok(content) => Html(content).into_response(),
        Err(e) => {
            warn!("🚨 Failed to read index.html from {}: {}", index_path, e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn init_tracing() {
    let default_filter = if cfg!(debug_assertions) {
        "inventory_adjustment_backend=debug,tower_http=info"
    } else {
        "inventory_adjustment_backend=info,tower_http=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_cors(cors_origins: &str) -> Result<CorsLayer> {
    let methods = [Method::GET, Method::POST];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    if cors_origins == "*" {
        if std::env::var("RUST_ENV").unwrap_or_default() == "production" {
            bail!("CORS wildcard (*) is not allowed in production. Set CORS_ORIGINS to specific origins.");
        }
        warn!("⚠️ CORS is configured with wildcard (*) - this is only acceptable for development!");
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers));
    }

    let origins: Vec<HeaderValue> = cors_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        bail!("No valid CORS origins found in CORS_ORIGINS: '{cors_origins}'");
    }

    info!("🔒 CORS configured for specific origins: {}", cors_origins);
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting Inventory Adjustment Backend v{}", VERSION);

    let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| constants::DEFAULT_SERVER_HOST.to_string());
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(constants::DEFAULT_SERVER_PORT);
    let cors_origins = std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
    let static_assets_path = std::env::var("STATIC_ASSETS_PATH")
        .unwrap_or_else(|_| constants::DEFAULT_STATIC_ASSETS_PATH.to_string());

    info!("Server configured to run on {}:{}", host, port);

    let upstream_config = UpstreamConfig::from_env();
    let client = UpstreamClient::new(upstream_config).context("Failed to initialize pharmacy API client")?;
    let service = AdjustmentService::new(InventoryApi::new(client), SnapshotStore::new());

    if tokio::fs::metadata(&static_assets_path).await.is_err() {
        warn!("⚠️  Static assets path {} not found - only the API will be served", static_assets_path);
    }
    info!("📁 Static assets will be served from: {}", static_assets_path);

    let state = AppState { static_assets_path };

    let cors = build_cors(&cors_origins)?;
    let limiter = upstream_rate_limiter(constants::UPSTREAM_RATE_LIMIT_PER_MINUTE);

    let app = Router::new()
        .route("/api/health", get(health_check))
        .nest(
            "/api/adjustment",
            adjustment::create_adjustment_routes(limiter).with_state(service),
        )
        .nest_service("/assets", ServeDir::new(format!("{}/assets", state.static_assets_path)))
        .fallback(handle_spa_or_static)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state);

    let address = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {address}"))?;

    info!("🎯 Inventory adjustment server started on http://{}", address);
    info!("🔧 API endpoints available at http://{}/api/", address);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_content_type() {
        assert_eq!(static_content_type("assets/app.js"), Some("application/javascript"));
        assert_eq!(static_content_type("favicon.ico"), Some("image/x-icon"));
        assert_eq!(static_content_type("adjustment/4987000000001"), None);
        assert_eq!(static_content_type("archive.tar.gz"), None);
    }

    #[test]
    fn test_asset_path_stays_under_root() {
        assert_eq!(
            asset_path("frontend/dist", "assets/app.js"),
            Some(PathBuf::from("frontend/dist/assets/app.js"))
        );
        assert_eq!(asset_path("frontend/dist", "../secret.json"), None);
        assert_eq!(asset_path("frontend/dist", "assets/../../secret.json"), None);
        assert_eq!(asset_path("frontend/dist", "/etc/passwd.json"), None);
    }

    #[tokio::test]
    async fn test_spa_fallback_does_not_serve_files_above_root() {
        use axum::body::{to_bytes, Body};
        use axum::http::Request;
        use tower::ServiceExt;

        let base = std::env::temp_dir().join(format!("adjustment-static-{}", uuid::Uuid::new_v4()));
        let dist = base.join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("index.html"), "<html>adjustment</html>").unwrap();
        std::fs::write(dist.join("app.js"), "console.log('ok')").unwrap();
        std::fs::write(base.join("secret.json"), r#"{"secret":"leak"}"#).unwrap();

        let app = Router::new().fallback(handle_spa_or_static).with_state(AppState {
            static_assets_path: dist.to_string_lossy().into_owned(),
        });

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/../secret.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("leak"));

        let response = app
            .oneshot(Request::builder().uri("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_build_cors_rejects_empty_origin_list() {
        assert!(build_cors(" , ").is_err());
        assert!(build_cors("http://localhost:4200, https://pharmacy.example.jp").is_ok());
    }
}

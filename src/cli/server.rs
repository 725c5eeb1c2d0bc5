//! HTTP server mode exposing resolution, refresh and an authenticated proxy

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery, State},
    http::{HeaderMap, Method as HttpMethod, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::http::{Outcome, RequestOptions};
use crate::layer::Layer;
use crate::resolver::{join_path, ResolutionContext};
use crate::types::Method;

/// Header selecting the credential key for proxied requests
pub const CREDENTIAL_KEY_HEADER: &str = "x-credential-key";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// App state shared across handlers
#[derive(Clone)]
struct AppState {
    layer: Layer,
}

/// Query for the resolve endpoint
#[derive(Debug, Deserialize)]
struct ResolveQuery {
    /// Path on the service
    #[serde(default)]
    path: String,
    /// Resolve as a browser caller
    #[serde(default)]
    browser: bool,
}

/// Optional body for the refresh endpoint
#[derive(Debug, Deserialize)]
struct RefreshBody {
    /// Override the attempts ceiling
    #[serde(default)]
    max_attempts: Option<u32>,
}

/// Response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Build the router without binding a socket
pub fn router(layer: Layer) -> Router {
    let state = AppState { layer };

    // Build CORS layer - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/resolve/:service", get(resolve))
        .route("/refresh/:key", post(refresh))
        .route("/proxy/:service/*path", any(proxy))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the HTTP server
pub async fn serve(layer: Layer, config: ServerConfig) -> Result<()> {
    let app = router(layer);
    let port = config.port;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind to port {port}: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::config(format!("Server error: {e}")))?;

    Ok(())
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// Resolve a service path
async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> impl IntoResponse {
    let resolver = state.layer.resolver();
    let environment = resolver.context().environment;
    let context = if query.browser {
        ResolutionContext::browser(environment)
    } else {
        ResolutionContext::server(environment)
    };

    let resolution = resolver.resolve_descriptor(&service, &context).await;
    let url = join_path(&resolution.base_url, &query.path);

    Json(ApiResponse::success(json!({
        "service": service,
        "url": url,
        "source": resolution.source,
        "environment": resolution.environment,
    })))
}

/// Attempt a token refresh for a credential key
async fn refresh(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Option<Json<RefreshBody>>,
) -> impl IntoResponse {
    let max_attempts = body.and_then(|Json(body)| body.max_attempts);
    let refreshed = state.layer.refresh(&key, max_attempts).await;

    Json(ApiResponse::success(json!({
        "credential_key": key,
        "refreshed": refreshed,
    })))
}

/// Forward a request to a backend service through the executor
async fn proxy(
    State(state): State<Arc<AppState>>,
    Path((service, path)): Path<(String, String)>,
    method: HttpMethod,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let Ok(method) = method.as_str().parse::<Method>() else {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(ApiResponse::<()>::error(format!("Unsupported method: {method}"))),
        )
            .into_response();
    };

    let mut options = RequestOptions::method(method);
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            options = options.query(key, value);
        }
    }
    if let Some(key) = headers
        .get(CREDENTIAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        options = options.credential_key(key);
    }
    if !body.is_empty() {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => options = options.json(value),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::<()>::error(format!("Invalid JSON body: {e}"))),
                )
                    .into_response();
            }
        }
    }

    match state.layer.request(&service, &path, options).await {
        Ok(Outcome::Success(response)) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
            (status, Json(response.body)).into_response()
        }
        Ok(Outcome::RequiresReauthentication(signal)) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "requires_reauthentication": true,
                "credential_key": signal.credential_key,
                "reason": signal.reason,
            })),
        )
            .into_response(),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::<()>::error(e.to_string())),
        )
            .into_response(),
    }
}

/// Map an executor error to the status returned by the proxy
fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Network { .. } | Error::ServerError { .. } => StatusCode::BAD_GATEWAY,
        Error::HttpStatus { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        Error::JsonParse(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

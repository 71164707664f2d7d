//! HTTP surface: a landing page and the telemetry endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{error, info};

use crate::error::Result;

#[derive(Clone)]
struct AppState {
    registry: Registry,
    telemetry_path: String,
}

/// Builds the service router: `/` serves a landing page, the configured
/// telemetry path serves the registry in text exposition format.
pub fn router(registry: Registry, telemetry_path: &str) -> Router {
    let state = AppState {
        registry,
        telemetry_path: telemetry_path.to_string(),
    };
    Router::new()
        .route("/", get(index))
        .route(telemetry_path, get(metrics))
        .with_state(state)
}

/// Binds `addr` and serves the router until the process exits.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html><head><title>Database Exporter</title></head>\
         <body><h1>Database Exporter</h1>\
         <p><a href=\"{0}\">Metrics</a></p></body></html>",
        state.telemetry_path
    ))
}

async fn metrics(State(state): State<AppState>) -> Response {
    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        error!(%err, "error encoding metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response();
    }
    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}

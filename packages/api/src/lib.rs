// ABOUTME: Tool registry HTTP surface: manifest and per-tool endpoints with CORS
// ABOUTME: Also provides the typed client other components use to consume a registry

use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod client;
pub mod error;
pub mod handlers;
pub mod manifest;
pub mod response;

pub use client::ToolRegistryClient;
pub use error::{RegistryError, Result};
pub use handlers::RegistryState;
pub use manifest::{ToolManifest, PROTOCOL_VERSION};
pub use response::CACHE_CONTROL_VALUE;

/// Creates the tool registry router
pub fn create_registry_router(state: RegistryState) -> Router {
    Router::new()
        .route(
            "/api/v1/tools",
            get(handlers::list_tools).options(handlers::preflight),
        )
        .route(
            "/api/v1/tools/{name}",
            get(handlers::get_tool).options(handlers::preflight),
        )
        .route("/health", get(handlers::health))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the registry until the process exits.
pub async fn serve(addr: SocketAddr, state: RegistryState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Tool registry listening");
    axum::serve(listener, create_registry_router(state)).await
}

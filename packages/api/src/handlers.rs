// ABOUTME: HTTP request handlers for the tool registry
// ABOUTME: Serves the manifest, single tools, health, and CORS preflight

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::manifest::ToolManifest;
use crate::response::cacheable;

#[derive(Clone)]
pub struct RegistryState {
    pub manifest: Arc<RwLock<ToolManifest>>,
}

impl RegistryState {
    pub fn new(manifest: ToolManifest) -> Self {
        Self {
            manifest: Arc::new(RwLock::new(manifest)),
        }
    }

    pub async fn replace(&self, manifest: ToolManifest) {
        *self.manifest.write().await = manifest;
    }
}

pub async fn list_tools(State(state): State<RegistryState>) -> Response {
    let manifest = state.manifest.read().await;
    debug!(tools = manifest.tools.len(), "Serving tool manifest");
    cacheable(&*manifest)
}

pub async fn get_tool(
    State(state): State<RegistryState>,
    Path(name): Path<String>,
) -> Response {
    let manifest = state.manifest.read().await;
    match manifest.find_tool(&name) {
        Some(tool) => cacheable(tool),
        None => RegistryError::ToolNotFound(name).into_response(),
    }
}

pub async fn health(State(state): State<RegistryState>) -> Json<Value> {
    let manifest = state.manifest.read().await;
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "tool-registry",
        "scenario": manifest.scenario,
        "tools": manifest.tools.len(),
    }))
}

/// CORS headers come from the router's header layers.
pub async fn preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

// ABOUTME: Typed client for a scenario's tool registry
// ABOUTME: Fetches the manifest or a single tool; 404 on a tool maps to ToolNotFound

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::manifest::ToolManifest;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ToolRegistryClient {
    http: Client,
    base_url: String,
}

impl ToolRegistryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| RegistryError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_manifest(&self) -> Result<ToolManifest> {
        self.get_json("/api/v1/tools").await
    }

    pub async fn fetch_tool(&self, name: &str) -> Result<Value> {
        let path = format!("/api/v1/tools/{}", urlencoding::encode(name));
        match self.get_json(&path).await {
            Err(RegistryError::Remote { status: 404, .. }) => {
                Err(RegistryError::ToolNotFound(name.to_string()))
            }
            other => other,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Registry request");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| RegistryError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unexpected response")
                .to_string();
            return Err(RegistryError::Remote {
                url,
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|source| RegistryError::Transport { url, source })
    }
}

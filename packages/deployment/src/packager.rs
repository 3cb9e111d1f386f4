// ABOUTME: HTTP client for the remote desktop packager and build-status polling
// ABOUTME: Polling tolerates transient status errors and stops on terminal states or cancellation

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DeploymentError, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlatformResult {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildStatus {
    #[serde(default)]
    pub build_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default)]
    pub platform_results: BTreeMap<String, PlatformResult>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BuildStatus {
    pub fn is_success(&self) -> bool {
        matches!(self.status.as_str(), "ready" | "completed" | "success")
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    /// Platform → binary path for every platform that produced one.
    pub fn binaries(&self) -> BTreeMap<String, String> {
        self.platform_results
            .iter()
            .filter_map(|(platform, result)| {
                result
                    .binary_path
                    .as_ref()
                    .map(|path| (platform.clone(), path.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildBinariesRequest {
    pub manifest_path: String,
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesktopGenerateRequest {
    pub manifest_path: String,
    pub platforms: Vec<String>,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallerRequest {
    pub build_id: String,
    pub platforms: Vec<String>,
}

#[async_trait]
pub trait BuildStatusSource: Send + Sync {
    async fn get_build_status(&self, build_id: &str) -> Result<BuildStatus>;
}

/// Remote packager operations the orchestrator drives.
#[async_trait]
pub trait Packager: BuildStatusSource {
    async fn build_binaries(&self, request: &BuildBinariesRequest) -> Result<BuildStatus>;

    async fn generate_desktop(&self, request: &DesktopGenerateRequest) -> Result<BuildStatus>;

    async fn build_installers(&self, request: &InstallerRequest) -> Result<BuildStatus>;
}

#[derive(Debug, Clone)]
pub struct PackagerClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl PackagerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(DeploymentError::Configuration(
                "packager base URL is empty".to_string(),
            ));
        }
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeploymentError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, T>(&self, op: &str, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(op, url = %url, "Packager request");

        let mut request = self.http.request(method, &url).timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|source| DeploymentError::Transport {
            op: op.to_string(),
            url: url.clone(),
            source,
        })?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                response.json().await.map_err(|source| DeploymentError::Transport {
                    op: op.to_string(),
                    url,
                    source,
                })
            }
            status => Err(DeploymentError::Remote {
                op: op.to_string(),
                url,
                status: status.as_u16(),
                message: error_message(response).await,
            }),
        }
    }
}

/// Prefer a JSON `error` field, otherwise a bounded prefix of the body.
async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    let mut end = text.len().min(ERROR_BODY_LIMIT);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].trim().to_string()
}

#[async_trait]
impl BuildStatusSource for PackagerClient {
    async fn get_build_status(&self, build_id: &str) -> Result<BuildStatus> {
        let path = format!("/api/v1/desktop/status/{}", urlencoding::encode(build_id));
        self.call::<(), _>("get build status", Method::GET, &path, None)
            .await
    }
}

#[async_trait]
impl Packager for PackagerClient {
    async fn build_binaries(&self, request: &BuildBinariesRequest) -> Result<BuildStatus> {
        self.call("build binaries", Method::POST, "/api/v1/build/binaries", Some(request))
            .await
    }

    async fn generate_desktop(&self, request: &DesktopGenerateRequest) -> Result<BuildStatus> {
        self.call(
            "generate desktop wrapper",
            Method::POST,
            "/api/v1/desktop/generate",
            Some(request),
        )
        .await
    }

    async fn build_installers(&self, request: &InstallerRequest) -> Result<BuildStatus> {
        self.call(
            "build installers",
            Method::POST,
            "/api/v1/desktop/installers",
            Some(request),
        )
        .await
    }
}

pub fn clamp_poll_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Poll `build_id` until it reaches a terminal state.
///
/// Status fetch errors are logged and retried on the next tick. A `failed`
/// build returns [`DeploymentError::BuildFailed`] carrying the remote message.
pub async fn wait_for_build<S>(
    source: &S,
    build_id: &str,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<BuildStatus>
where
    S: BuildStatusSource + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return Err(DeploymentError::Cancelled);
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(DeploymentError::Cancelled),
            fetched = source.get_build_status(build_id) => fetched,
        };

        match fetched {
            Ok(status) if status.is_success() => return Ok(status),
            Ok(status) if status.is_failed() => {
                return Err(DeploymentError::BuildFailed {
                    build_id: build_id.to_string(),
                    message: status
                        .error
                        .unwrap_or_else(|| "build failed without an error message".to_string()),
                })
            }
            Ok(status) => {
                debug!(build_id, status = %status.status, "Build still in progress");
            }
            Err(e) => {
                warn!(build_id, error = %e, "Failed to fetch build status, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(DeploymentError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<VecDeque<Result<BuildStatus>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<BuildStatus>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl BuildStatusSource for Scripted {
        async fn get_build_status(&self, build_id: &str) -> Result<BuildStatus> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(BuildStatus {
                        build_id: build_id.to_string(),
                        status: "building".into(),
                        ..Default::default()
                    })
                })
        }
    }

    fn status(value: &str) -> Result<BuildStatus> {
        Ok(BuildStatus {
            build_id: "b1".into(),
            status: value.into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let source = Scripted::new(vec![
            Err(DeploymentError::Configuration("flaky".into())),
            status("building"),
            status("completed"),
        ]);
        let cancel = CancellationToken::new();
        let result = wait_for_build(&source, "b1", Duration::from_millis(5), &cancel)
            .await
            .unwrap();
        assert_eq!(result.status, "completed");
    }

    #[tokio::test]
    async fn test_failed_build_carries_remote_message() {
        let mut failed = status("failed").unwrap();
        failed.error = Some("signtool missing".into());
        let source = Scripted::new(vec![Ok(failed)]);
        let cancel = CancellationToken::new();

        match wait_for_build(&source, "b1", Duration::from_millis(5), &cancel).await {
            Err(DeploymentError::BuildFailed { build_id, message }) => {
                assert_eq!(build_id, "b1");
                assert_eq!(message, "signtool missing");
            }
            other => panic!("expected BuildFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let source = Scripted::new(vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = wait_for_build(&source, "b1", Duration::from_millis(5), &cancel).await;
        assert!(matches!(result, Err(DeploymentError::Cancelled)));
    }

    struct Stalled;

    #[async_trait]
    impl BuildStatusSource for Stalled {
        async fn get_build_status(&self, build_id: &str) -> Result<BuildStatus> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(BuildStatus {
                build_id: build_id.to_string(),
                status: "building".into(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_slow_status_request() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = wait_for_build(&Stalled, "b1", Duration::from_millis(5), &cancel).await;
        assert!(matches!(result, Err(DeploymentError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        assert_eq!(clamp_poll_interval(Duration::from_secs(1)), MIN_POLL_INTERVAL);
        assert_eq!(clamp_poll_interval(Duration::from_secs(60)), MAX_POLL_INTERVAL);
        assert_eq!(
            clamp_poll_interval(Duration::from_secs(4)),
            Duration::from_secs(4)
        );
    }
}

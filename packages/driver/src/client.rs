// ABOUTME: HTTP client for the remote browser driver's session-scoped endpoints
// ABOUTME: Maps non-success statuses to structured errors with troubleshooting hints

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;
use vrooli_core::{CompiledInstruction, StepOutcome};

use crate::decode::decode_run_instruction;
use crate::error::{DriverError, Result, ERROR_BODY_PREFIX_BYTES};
use crate::timeline::to_recorded_action;
use crate::wire::*;

/// Timeout for session and recording calls.
pub const DEFAULT_RECORDING_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for instruction execution and replay.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The subset of driver operations the workflow executor depends on.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<String>;

    async fn run_instruction(
        &self,
        session_id: &str,
        instruction: &CompiledInstruction,
    ) -> Result<StepOutcome>;

    async fn reset_session(&self, session_id: &str) -> Result<()>;

    async fn close_session(&self, session_id: &str) -> Result<()>;
}

/// Stateless client; cheap to clone and safe to share across sessions.
#[derive(Debug, Clone)]
pub struct DriverClient {
    http: Client,
    base_url: String,
    recording_timeout: Duration,
    execution_timeout: Duration,
}

impl DriverClient {
    /// Build a client for `base_url`; trailing slashes are trimmed.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(DriverError::configuration(
                "configure client",
                "",
                "driver base URL is empty",
            ));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                DriverError::configuration("configure client", &base_url, "failed to build HTTP client")
                    .with_cause(e.to_string())
            })?;

        Ok(Self {
            http,
            base_url,
            recording_timeout: DEFAULT_RECORDING_TIMEOUT,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, recording: Duration, execution: Duration) -> Self {
        self.recording_timeout = recording;
        self.execution_timeout = execution;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let op = "health check";
        let (url, response) = self
            .send::<()>(op, Method::GET, "/health", None, self.recording_timeout)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DriverError::transport(op, &url, &e))?;
        // Plain-text bodies ("OK") are healthy too
        Ok(serde_json::from_slice(&bytes).unwrap_or_else(|_| HealthStatus {
            status: "ok".to_string(),
            ..Default::default()
        }))
    }

    pub async fn create_session(&self, request: &CreateSessionRequest) -> Result<String> {
        let op = "create session";
        let (url, response) = self
            .send(op, Method::POST, "/session/start", Some(request), self.recording_timeout)
            .await?;
        let body: CreateSessionResponse = decode_json(op, &url, response).await?;
        let session_id = body.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(DriverError::validation(
                op,
                &url,
                "driver returned an empty session_id",
            ));
        }
        debug!(session_id = %session_id, execution_id = %request.execution_id, "Driver session created");
        Ok(session_id)
    }

    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        let path = session_path("close session", session_id, "close")?;
        self.send::<()>("close session", Method::POST, &path, None, self.recording_timeout)
            .await?;
        Ok(())
    }

    pub async fn reset_session(&self, session_id: &str) -> Result<()> {
        let path = session_path("reset session", session_id, "reset")?;
        self.send::<()>("reset session", Method::POST, &path, None, self.recording_timeout)
            .await?;
        Ok(())
    }

    pub async fn start_recording(
        &self,
        session_id: &str,
        request: &StartRecordingRequest,
    ) -> Result<RecordingState> {
        self.call_json(
            "start recording",
            Method::POST,
            session_id,
            "record/start",
            Some(request),
            self.recording_timeout,
        )
        .await
    }

    pub async fn stop_recording(&self, session_id: &str) -> Result<RecordingState> {
        self.call_json::<(), _>(
            "stop recording",
            Method::POST,
            session_id,
            "record/stop",
            None,
            self.recording_timeout,
        )
        .await
    }

    pub async fn get_recording_status(&self, session_id: &str) -> Result<RecordingState> {
        self.call_json::<(), _>(
            "get recording status",
            Method::GET,
            session_id,
            "record/status",
            None,
            self.recording_timeout,
        )
        .await
    }

    /// Fetch recorded actions. A response carrying only timeline `entries`
    /// is converted so callers always see the legacy `actions` shape.
    pub async fn get_recorded_actions(
        &self,
        session_id: &str,
        clear: bool,
    ) -> Result<RecordedActions> {
        let suffix = if clear {
            "record/actions?clear=true"
        } else {
            "record/actions"
        };
        let body: RecordedActionsResponse = self
            .call_json::<(), _>(
                "get recorded actions",
                Method::GET,
                session_id,
                suffix,
                None,
                self.recording_timeout,
            )
            .await?;

        let actions = if body.actions.is_empty() && !body.entries.is_empty() {
            body.entries.iter().map(to_recorded_action).collect()
        } else {
            body.actions
        };

        Ok(RecordedActions {
            session_id: if body.session_id.is_empty() {
                session_id.to_string()
            } else {
                body.session_id
            },
            is_recording: body.is_recording,
            actions,
        })
    }

    pub async fn navigate(
        &self,
        session_id: &str,
        request: &NavigateRequest,
    ) -> Result<NavigateResponse> {
        self.call_json(
            "navigate",
            Method::POST,
            session_id,
            "record/navigate",
            Some(request),
            self.recording_timeout,
        )
        .await
    }

    pub async fn update_viewport(&self, session_id: &str, viewport: Viewport) -> Result<Viewport> {
        let op = "update viewport";
        let path = session_path(op, session_id, "record/viewport")?;
        let (url, response) = self
            .send(op, Method::POST, &path, Some(&viewport), self.recording_timeout)
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DriverError::transport(op, &url, &e))?;
        // Drivers that echo nothing keep the requested size
        Ok(serde_json::from_slice(&bytes).unwrap_or(viewport))
    }

    pub async fn validate_selector(
        &self,
        session_id: &str,
        selector: &str,
    ) -> Result<ValidateSelectorResponse> {
        let body = serde_json::json!({ "selector": selector });
        self.call_json(
            "validate selector",
            Method::POST,
            session_id,
            "record/validate-selector",
            Some(&body),
            self.recording_timeout,
        )
        .await
    }

    pub async fn replay_preview(
        &self,
        session_id: &str,
        request: &ReplayPreviewRequest,
    ) -> Result<ReplayPreviewResponse> {
        self.call_json(
            "replay preview",
            Method::POST,
            session_id,
            "record/replay-preview",
            Some(request),
            self.execution_timeout,
        )
        .await
    }

    pub async fn update_stream_settings(
        &self,
        session_id: &str,
        request: &StreamSettingsRequest,
    ) -> Result<StreamSettingsResponse> {
        self.call_json(
            "update stream settings",
            Method::POST,
            session_id,
            "record/stream-settings",
            Some(request),
            self.recording_timeout,
        )
        .await
    }

    pub async fn capture_screenshot(
        &self,
        session_id: &str,
        request: &ScreenshotRequest,
    ) -> Result<CapturedImage> {
        let op = "capture screenshot";
        let path = session_path(op, session_id, "record/screenshot")?;
        let (url, response) = self
            .send(op, Method::POST, &path, Some(request), self.recording_timeout)
            .await?;
        read_image(op, &url, response).await
    }

    /// Latest streamed frame, either as a raw image body or a JSON envelope.
    pub async fn get_frame(&self, session_id: &str) -> Result<CapturedImage> {
        let op = "get frame";
        let path = session_path(op, session_id, "record/frame")?;
        let (url, response) = self
            .send::<()>(op, Method::GET, &path, None, self.recording_timeout)
            .await?;
        read_image(op, &url, response).await
    }

    pub async fn forward_input(&self, session_id: &str, event: &InputEvent) -> Result<()> {
        let op = "forward input";
        let path = session_path(op, session_id, "record/input")?;
        self.send(op, Method::POST, &path, Some(event), self.recording_timeout)
            .await?;
        Ok(())
    }

    pub async fn get_storage_state(&self, session_id: &str) -> Result<JsonValue> {
        self.call_json::<(), _>(
            "get storage state",
            Method::GET,
            session_id,
            "storage-state",
            None,
            self.recording_timeout,
        )
        .await
    }

    /// Submit a batch without waiting for outcomes.
    pub async fn run_instructions(
        &self,
        session_id: &str,
        instructions: &[CompiledInstruction],
    ) -> Result<()> {
        let op = "run instructions";
        let path = session_path(op, session_id, "run")?;
        let body = RunInstructionsRequest {
            instructions: instructions.iter().map(InstructionPayload::from).collect(),
            fire_and_forget: true,
        };
        self.send(op, Method::POST, &path, Some(&body), self.execution_timeout)
            .await?;
        Ok(())
    }

    pub async fn run_instruction(
        &self,
        session_id: &str,
        instruction: &CompiledInstruction,
    ) -> Result<StepOutcome> {
        self.run_instruction_with_timeout(session_id, instruction, self.execution_timeout)
            .await
    }

    pub async fn run_instruction_with_timeout(
        &self,
        session_id: &str,
        instruction: &CompiledInstruction,
        timeout: Duration,
    ) -> Result<StepOutcome> {
        let op = "run instruction";
        let path = session_path(op, session_id, "run")?;
        let body = RunInstructionRequest {
            instruction: InstructionPayload::from(instruction),
        };
        let (url, response) = self
            .send(op, Method::POST, &path, Some(&body), timeout)
            .await?;
        let raw: RunInstructionResponse = decode_json(op, &url, response).await?;
        decode_run_instruction(op, &url, instruction, raw)
    }

    async fn call_json<B, T>(
        &self,
        op: &str,
        method: Method,
        session_id: &str,
        suffix: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let path = session_path(op, session_id, suffix)?;
        let (url, response) = self.send(op, method, &path, body, timeout).await?;
        decode_json(op, &url, response).await
    }

    async fn send<B>(
        &self,
        op: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<(String, Response)>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(op, url = %url, "Driver request");

        let mut request = self.http.request(method, &url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DriverError::transport(op, &url, &e))?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok((url, response)),
            status => {
                let body = read_body_prefix(response).await;
                Err(DriverError::remote(op, &url, status.as_u16(), &body))
            }
        }
    }
}

#[async_trait]
impl BrowserDriver for DriverClient {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<String> {
        DriverClient::create_session(self, request).await
    }

    async fn run_instruction(
        &self,
        session_id: &str,
        instruction: &CompiledInstruction,
    ) -> Result<StepOutcome> {
        DriverClient::run_instruction(self, session_id, instruction).await
    }

    async fn reset_session(&self, session_id: &str) -> Result<()> {
        DriverClient::reset_session(self, session_id).await
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        DriverClient::close_session(self, session_id).await
    }
}

fn session_path(op: &str, session_id: &str, suffix: &str) -> Result<String> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(DriverError::configuration(op, "", "session id is required"));
    }
    Ok(format!(
        "/session/{}/{}",
        urlencoding::encode(session_id),
        suffix
    ))
}

async fn decode_json<T>(op: &str, url: &str, response: Response) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let bytes = response
        .bytes()
        .await
        .map_err(|e| DriverError::transport(op, url, &e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        DriverError::validation(op, url, "response body could not be decoded").with_cause(e.to_string())
    })
}

async fn read_image(op: &str, url: &str, response: Response) -> Result<CapturedImage> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("image/") {
        let data = response
            .bytes()
            .await
            .map_err(|e| DriverError::transport(op, url, &e))?
            .to_vec();
        return Ok(CapturedImage {
            data,
            media_type: content_type,
            width: None,
            height: None,
        });
    }

    let envelope: ScreenshotResponse = decode_json(op, url, response).await?;
    let data = STANDARD.decode(envelope.data.trim()).map_err(|e| {
        DriverError::validation(op, url, "image data is not valid base64").with_cause(e.to_string())
    })?;
    Ok(CapturedImage {
        data,
        media_type: envelope
            .media_type
            .unwrap_or_else(|| vrooli_core::constants::DEFAULT_SCREENSHOT_MEDIA_TYPE.to_string()),
        width: envelope.width,
        height: envelope.height,
    })
}

/// Read at most `ERROR_BODY_PREFIX_BYTES` of a response body.
async fn read_body_prefix(mut response: Response) -> String {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < ERROR_BODY_PREFIX_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buf.truncate(ERROR_BODY_PREFIX_BYTES);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slashes() {
        let client = DriverClient::new("http://localhost:39400///").unwrap();
        assert_eq!(client.base_url(), "http://localhost:39400");
    }

    #[test]
    fn test_empty_base_url_is_configuration_error() {
        let err = DriverClient::new("   ").unwrap_err();
        assert_eq!(err.kind, crate::error::DriverErrorKind::Configuration);
    }

    #[test]
    fn test_session_path_requires_id() {
        assert_eq!(
            session_path("close session", "abc", "close").unwrap(),
            "/session/abc/close"
        );
        assert!(session_path("close session", " ", "close").is_err());
        assert_eq!(
            session_path("run instruction", "../admin?x=1", "run").unwrap(),
            "/session/..%2Fadmin%3Fx%3D1/run"
        );
    }
}

// ABOUTME: Structured driver error carrying operation, URL, status, cause and hint
// ABOUTME: Classifies failures and attaches troubleshooting hints from known body substrings

use std::fmt;

/// Name used as the subject of rendered driver errors.
pub const DRIVER_NAME: &str = "playwright-driver";

/// Maximum number of response body bytes read when building an error.
pub const ERROR_BODY_PREFIX_BYTES: usize = 4096;

const SESSION_LIMIT_MARKER: &str = "Maximum concurrent sessions";

/// Failure classes surfaced by the driver client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Missing client, empty base URL or missing required input.
    Configuration,
    /// Connect/read failures talking to the driver.
    Transport,
    /// Non-success HTTP status returned by the driver.
    Remote,
    /// The driver answered 200 with an unusable payload.
    Validation,
    /// The operation's deadline elapsed.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
}

/// Error returned by every driver operation.
///
/// Renders as `"<driver> <op> failed at <url> (status N): <message> (<cause>) [hint: <hint>]"`,
/// omitting the status, cause and hint segments when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub op: String,
    pub url: String,
    pub status: Option<u16>,
    pub message: String,
    pub hint: Option<String>,
    pub cause: Option<String>,
}

impl DriverError {
    fn base(kind: DriverErrorKind, op: &str, url: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            op: op.to_string(),
            url: url.to_string(),
            status: None,
            message: message.into(),
            hint: None,
            cause: None,
        }
    }

    pub fn configuration(op: &str, url: &str, message: impl Into<String>) -> Self {
        Self::base(DriverErrorKind::Configuration, op, url, message)
    }

    /// Error for an operation invoked without a configured client.
    pub fn not_configured(op: &str) -> Self {
        Self::configuration(op, "", "operation not configured: driver client is missing")
    }

    pub fn validation(op: &str, url: &str, message: impl Into<String>) -> Self {
        Self::base(DriverErrorKind::Validation, op, url, message)
    }

    pub fn cancelled(op: &str, url: &str) -> Self {
        Self::base(DriverErrorKind::Cancelled, op, url, "operation cancelled")
    }

    pub fn timeout(op: &str, url: &str, message: impl Into<String>) -> Self {
        Self::base(DriverErrorKind::Timeout, op, url, message)
    }

    /// Wrap a transport-level failure from the HTTP client.
    pub fn transport(op: &str, url: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            DriverErrorKind::Timeout
        } else {
            DriverErrorKind::Transport
        };
        let message = if err.is_timeout() {
            "request timed out"
        } else if err.is_decode() {
            "failed to decode response"
        } else {
            "request failed"
        };
        let mut error = Self::base(kind, op, url, message);
        error.cause = Some(error_chain(err));
        error
    }

    /// Build a remote error from a non-success status and a bounded body prefix.
    pub fn remote(op: &str, url: &str, status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("unexpected status {}", status)
        } else {
            body.trim().to_string()
        };
        let mut error = Self::base(DriverErrorKind::Remote, op, url, message);
        error.status = Some(status);
        error.hint = hint_for_body(body);
        error
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// True when the underlying cause is a refused connection or unresolved host.
    pub fn is_connection_error(&self) -> bool {
        self.cause
            .as_deref()
            .map(|cause| {
                let lowered = cause.to_lowercase();
                lowered.contains("connection refused") || lowered.contains("no such host")
            })
            .unwrap_or(false)
    }

    /// True when the driver rejected the request because of its session cap.
    pub fn is_session_limit_error(&self) -> bool {
        self.message.contains(SESSION_LIMIT_MARKER)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == DriverErrorKind::Cancelled
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == DriverErrorKind::Timeout
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed", DRIVER_NAME, self.op)?;
        if !self.url.is_empty() {
            write!(f, " at {}", self.url)?;
        }
        if let Some(status) = self.status {
            write!(f, " (status {})", status)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({})", cause)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " [hint: {}]", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Match known failure signatures in a response body.
pub fn hint_for_body(body: &str) -> Option<String> {
    if body.contains(SESSION_LIMIT_MARKER) {
        return Some(
            "the driver is at its session limit; close idle sessions or raise MAX_SESSIONS"
                .to_string(),
        );
    }
    let lowered = body.to_lowercase();
    if lowered.contains("browser") && lowered.contains("launch") {
        return Some(
            "the driver could not launch a browser; make sure browser binaries are installed \
             (npx playwright install chromium) and the host has enough memory"
                .to_string(),
        );
    }
    None
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_includes_all_segments() {
        let err = DriverError::remote(
            "create session",
            "http://driver/session/start",
            503,
            "Maximum concurrent sessions (10) reached",
        )
        .with_cause("upstream busy");

        assert_eq!(
            err.to_string(),
            "playwright-driver create session failed at http://driver/session/start (status 503): \
             Maximum concurrent sessions (10) reached (upstream busy) \
             [hint: the driver is at its session limit; close idle sessions or raise MAX_SESSIONS]"
        );
        assert!(err.is_session_limit_error());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_display_omits_missing_segments() {
        let err = DriverError::validation("create session", "http://d/session/start", "empty session id");
        assert_eq!(
            err.to_string(),
            "playwright-driver create session failed at http://d/session/start: empty session id"
        );
    }

    #[test]
    fn test_connection_error_detection() {
        let err = DriverError::configuration("health", "http://d/health", "request failed")
            .with_cause("tcp connect error: Connection refused (os error 111)");
        assert!(err.is_connection_error());

        let err = DriverError::configuration("health", "http://d/health", "request failed")
            .with_cause("dial tcp: lookup driver: no such host");
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_browser_launch_hint() {
        let hint = hint_for_body("Error: Browser failed to launch: missing libnss3").unwrap();
        assert!(hint.contains("launch a browser"));
        assert!(hint_for_body("plain failure").is_none());
    }

    #[test]
    fn test_not_configured_message() {
        let err = DriverError::not_configured("run instruction");
        assert_eq!(err.kind, DriverErrorKind::Configuration);
        assert!(err.to_string().contains("operation not configured"));
    }
}

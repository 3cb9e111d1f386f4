// ABOUTME: Shared API response types for the tool registry endpoints
// ABOUTME: Errors use the {success, data, error} envelope; manifests are served bare

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json as ResponseJson, Response},
};
use serde::Serialize;

use crate::error::RegistryError;

pub const CACHE_CONTROL_VALUE: &str = "public, max-age=60";

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// JSON body with the registry cache policy attached.
pub fn cacheable<T: Serialize>(body: T) -> Response {
    let mut response = ResponseJson(body).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    response
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RegistryError::ToolNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            RegistryError::InvalidManifest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, ResponseJson(ApiResponse::<()>::error(message))).into_response()
    }
}

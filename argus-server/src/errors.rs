use axum::{
    Json,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use argus_core::AdmissionError;
use argus_core::store::CancelError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error shape returned to HTTP callers: a status, a machine-readable
/// JSON body, and optional extra headers (credit accounting, Retry-After).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub detail: serde_json::Value,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: serde_json::Value::Null,
            headers: Vec::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    fn with_header(mut self, name: HeaderName, value: String) -> Self {
        if let Ok(value) = HeaderValue::from_str(&value) {
            self.headers.push((name, value));
        }
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
                "detail": self.detail,
            }
        }));

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            headers.insert(name, value);
        }

        (self.status, headers, body).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                ApiError::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate limit exceeded",
                )
                .with_detail(json!({ "retry_after_seconds": secs }))
                .with_header(
                    HeaderName::from_static("retry-after"),
                    secs.to_string(),
                )
            }
            AdmissionError::UnknownCollector { scan_type } => {
                ApiError::unprocessable(format!(
                    "unknown scan type {scan_type:?}"
                ))
                .with_detail(json!({ "scan_type": scan_type }))
            }
            AdmissionError::UnknownAccount => {
                ApiError::unauthorized("account not found")
            }
            AdmissionError::AccountInactive => {
                ApiError::forbidden("account is inactive")
            }
            AdmissionError::InsufficientCredits {
                required,
                available,
            } => {
                let shortfall = required.saturating_sub(available);
                ApiError::new(
                    StatusCode::PAYMENT_REQUIRED,
                    format!(
                        "insufficient credits: required {required}, available {available}"
                    ),
                )
                .with_detail(json!({
                    "required": required,
                    "available": available,
                    "shortfall": shortfall,
                }))
                .with_header(
                    HeaderName::from_static("x-credits-required"),
                    required.to_string(),
                )
                .with_header(
                    HeaderName::from_static("x-credits-available"),
                    available.to_string(),
                )
                .with_header(
                    HeaderName::from_static("x-credits-shortfall"),
                    shortfall.to_string(),
                )
            }
        }
    }
}

impl From<CancelError> for ApiError {
    fn from(err: CancelError) -> Self {
        match err {
            CancelError::NotFound => ApiError::not_found("unknown task"),
            CancelError::AlreadyTerminal(status) => ApiError::conflict(
                format!("task already terminal ({status})"),
            ),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

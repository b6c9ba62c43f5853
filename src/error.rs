use crate::constants::{
    API_ERROR_AUTH_REQUIRED, API_VERSION, BASIC_CHALLENGE, HEADER_API_VERSION, HEADER_JSON,
    HEADER_NOSNIFF, NOSNIFF,
};
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Registry API v2 error codes emitted by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    Denied,
    NotFound,
    Unavailable,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Denied => "DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Denied => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct RegistryError {
    pub code: ErrorCode,
    pub message: String,
}

impl RegistryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, API_ERROR_AUTH_REQUIRED)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Denied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    code: &'a str,
    message: &'a str,
    detail: Option<()>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    errors: [ErrorEntry<'a>; 1],
}

/// Serializes the single-entry `{"errors":[...]}` document.
pub fn error_body(code: ErrorCode, message: &str) -> Vec<u8> {
    let envelope = ErrorEnvelope {
        errors: [ErrorEntry {
            code: code.as_str(),
            message,
            detail: None,
        }],
    };
    serde_json::to_vec(&envelope).unwrap_or_else(|_| {
        format!(
            "{{\"errors\":[{{\"code\":\"{}\",\"message\":\"\",\"detail\":null}}]}}",
            code.as_str()
        )
        .into_bytes()
    })
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let mut builder = Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, HEADER_JSON)
            .header(HEADER_API_VERSION, API_VERSION)
            .header(HEADER_NOSNIFF, NOSNIFF);
        if self.code == ErrorCode::Unauthorized {
            builder = builder.header(header::WWW_AUTHENTICATE, BASIC_CHALLENGE);
        }
        let status = self.status();
        builder
            .body(Body::from(error_body(self.code, &self.message)))
            .unwrap_or_else(|_| {
                let mut fallback = Response::new(Body::empty());
                *fallback.status_mut() = status;
                fallback
            })
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        tracing::warn!(error = %err, "registry backend request failed");
        RegistryError::unavailable(crate::constants::API_ERROR_BACKEND_UNREACHABLE)
    }
}

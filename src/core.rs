//! Core error types for actlink
//!
//! Every public operation returns [`SdkError`]. Errors raised by lower layers
//! (HTTP transport, JSON decoding, `anyhow` chains from callers) are funneled
//! through [`SdkError::normalize`] so callers always get a stable [`ErrorCode`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = SdkError> = std::result::Result<T, E>;

/// Stable error codes callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    NoConnectedAccountFound,
    AuthModeRequired,
    NoRunId,
    PollLimitExceeded,
    InvalidParameter,
    BackendNotFound,
    BackendBadRequest,
    BackendUnauthorized,
    BackendRateLimit,
    BackendServerError,
    BackendTransport,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoConnectedAccountFound => "SDK::NO_CONNECTED_ACCOUNT_FOUND",
            ErrorCode::AuthModeRequired => "SDK::AUTH_MODE_REQUIRED",
            ErrorCode::NoRunId => "SDK::NO_RUN_ID",
            ErrorCode::PollLimitExceeded => "SDK::POLL_LIMIT_EXCEEDED",
            ErrorCode::InvalidParameter => "SDK::INVALID_PARAMETER",
            ErrorCode::BackendNotFound => "BACKEND::NOT_FOUND",
            ErrorCode::BackendBadRequest => "BACKEND::BAD_REQUEST",
            ErrorCode::BackendUnauthorized => "BACKEND::UNAUTHORIZED",
            ErrorCode::BackendRateLimit => "BACKEND::RATE_LIMIT",
            ErrorCode::BackendServerError => "BACKEND::SERVER_ERROR",
            ErrorCode::BackendTransport => "BACKEND::TRANSPORT",
            ErrorCode::Unknown => "COMMON::UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of an [`SdkError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    PolicyViolation,
    Upstream,
    Unknown,
}

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Validation failure listing every violated field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single-field failure
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.push(field, message);
        err
    }

    /// Record a violation
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Names of all violated fields, in the order they were recorded
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid parameters: {}", self.summary())
    }
}

impl std::error::Error for ValidationError {}

/// Error returned by every public actlink operation
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    NotFound {
        code: ErrorCode,
        message: String,
        description: String,
    },

    #[error("{message}")]
    PolicyViolation {
        code: ErrorCode,
        message: String,
        description: String,
    },

    #[error("{message}")]
    Upstream {
        code: ErrorCode,
        status: Option<u16>,
        message: String,
        description: String,
    },

    #[error("{message}")]
    Unknown { message: String, description: String },
}

impl SdkError {
    pub fn not_found(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        SdkError::NotFound {
            code,
            description: message.clone(),
            message,
        }
    }

    pub fn policy(code: ErrorCode, message: impl Into<String>, description: impl Into<String>) -> Self {
        SdkError::PolicyViolation {
            code,
            message: message.into(),
            description: description.into(),
        }
    }

    pub fn upstream(code: ErrorCode, status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        SdkError::Upstream {
            code,
            status,
            description: message.clone(),
            message,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        SdkError::Unknown {
            description: message.clone(),
            message,
        }
    }

    pub fn no_connected_account(app: &str, entity_id: &str) -> Self {
        SdkError::not_found(
            ErrorCode::NoConnectedAccountFound,
            format!(
                "Could not find a connection with app='{}' and entity='{}'",
                app, entity_id
            ),
        )
    }

    /// Map a non-success HTTP status (and its body) to an error
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("Request failed with status {}", status)
        } else {
            format!("Request failed with status {}: {}", status, body)
        };
        match status {
            404 => SdkError::not_found(ErrorCode::BackendNotFound, message),
            400 | 422 => SdkError::upstream(ErrorCode::BackendBadRequest, Some(status), message),
            401 | 403 => SdkError::upstream(ErrorCode::BackendUnauthorized, Some(status), message),
            429 => SdkError::upstream(ErrorCode::BackendRateLimit, Some(status), message),
            500..=599 => SdkError::upstream(ErrorCode::BackendServerError, Some(status), message),
            _ => SdkError::upstream(ErrorCode::Unknown, Some(status), message),
        }
    }

    /// Normalize an arbitrary error chain into an `SdkError`
    pub fn normalize(err: anyhow::Error) -> Self {
        let err = match err.downcast::<SdkError>() {
            Ok(sdk) => return sdk,
            Err(err) => err,
        };
        let err = match err.downcast::<ValidationError>() {
            Ok(validation) => return SdkError::Validation(validation),
            Err(err) => err,
        };
        let err = match err.downcast::<reqwest::Error>() {
            Ok(http) => return SdkError::from(http),
            Err(err) => err,
        };
        match err.downcast::<serde_json::Error>() {
            Ok(json) => SdkError::from(json),
            Err(other) => SdkError::unknown(format!("{:#}", other)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Validation(_) => ErrorKind::Validation,
            SdkError::NotFound { .. } => ErrorKind::NotFound,
            SdkError::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            SdkError::Upstream { .. } => ErrorKind::Upstream,
            SdkError::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SdkError::Validation(_) => ErrorCode::InvalidParameter,
            SdkError::NotFound { code, .. }
            | SdkError::PolicyViolation { code, .. }
            | SdkError::Upstream { code, .. } => *code,
            SdkError::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Human-readable description suitable for logs
    pub fn description(&self) -> String {
        match self {
            SdkError::Validation(v) => v.to_string(),
            SdkError::NotFound { description, .. }
            | SdkError::PolicyViolation { description, .. }
            | SdkError::Upstream { description, .. }
            | SdkError::Unknown { description, .. } => description.clone(),
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SdkError::from_status(status.as_u16(), "");
        }
        if err.is_decode() {
            return SdkError::upstream(
                ErrorCode::BackendBadRequest,
                None,
                format!("Failed to decode response: {}", err),
            );
        }
        let mut chain = format!("HTTP request failed: {}", err);
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            chain.push_str(&format!(" -> {}", cause));
            source = cause.source();
        }
        SdkError::upstream(ErrorCode::BackendTransport, None, chain)
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Validation(ValidationError::single("json", err.to_string()))
    }
}

impl From<anyhow::Error> for SdkError {
    fn from(err: anyhow::Error) -> Self {
        SdkError::normalize(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let mut err = ValidationError::new();
        err.push("action_name", "must not be empty");
        err.push("params", "must be a JSON object");

        assert_eq!(err.fields(), vec!["action_name", "params"]);
        let message = err.to_string();
        assert!(message.contains("action_name: must not be empty"));
        assert!(message.contains("params: must be a JSON object"));
    }

    #[test]
    fn test_empty_validation_is_ok() {
        assert!(ValidationError::new().into_result().is_ok());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SdkError::from_status(404, "").kind(), ErrorKind::NotFound);
        assert_eq!(
            SdkError::from_status(401, "nope").code(),
            ErrorCode::BackendUnauthorized
        );
        assert_eq!(SdkError::from_status(429, "").code(), ErrorCode::BackendRateLimit);
        assert_eq!(SdkError::from_status(503, "").code(), ErrorCode::BackendServerError);
        assert_eq!(SdkError::from_status(400, "").code(), ErrorCode::BackendBadRequest);
    }

    #[test]
    fn test_normalize_keeps_sdk_errors() {
        let original = SdkError::no_connected_account("github", "default");
        let normalized = SdkError::normalize(anyhow::Error::new(original));

        assert_eq!(normalized.code(), ErrorCode::NoConnectedAccountFound);
        assert!(normalized
            .description()
            .contains("app='github' and entity='default'"));
    }

    #[test]
    fn test_normalize_unknown_error() {
        let normalized = SdkError::normalize(anyhow::anyhow!("something odd"));
        assert_eq!(normalized.kind(), ErrorKind::Unknown);
        assert_eq!(normalized.code().as_str(), "COMMON::UNKNOWN");
        assert!(normalized.to_string().contains("something odd"));
    }

    #[test]
    fn test_normalize_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let normalized = SdkError::normalize(json_err.into());
        assert_eq!(normalized.kind(), ErrorKind::Validation);
    }
}

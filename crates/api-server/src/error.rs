//! HTTP error envelope
//!
//! Every error response has the shape
//! `{ "error": { "code": ..., "message": ..., "details"?: ... } }`
//! with the status derived from the code.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);
pub type ApiResult<T> = Result<T, ApiError>;

fn envelope(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }),
    )
}

pub fn validation_error(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
}

pub fn unauthorized(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

pub fn forbidden(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::FORBIDDEN, "FORBIDDEN", message)
}

pub fn feature_disabled(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::FORBIDDEN, "FEATURE_DISABLED", message)
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn conflict(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::CONFLICT, "CONFLICT", message)
}

pub fn internal_error(message: impl Into<String>) -> ApiError {
    envelope(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
}

pub fn map_identity_error(err: crate::auth::IdentityError) -> ApiError {
    use crate::auth::IdentityError;
    match err {
        IdentityError::InvalidInput(msg) => validation_error(msg),
        IdentityError::Unauthorized(msg) => unauthorized(msg),
        IdentityError::NotFound(msg) => not_found(msg),
        IdentityError::Conflict(msg) => conflict(msg),
        IdentityError::Storage(msg) => {
            error!("Identity storage error: {}", msg);
            internal_error("Internal server error")
        }
    }
}

pub fn map_core_error(err: hf_core::Error) -> ApiError {
    use hf_core::Error;
    match err {
        Error::NotFound(msg) => not_found(msg),
        Error::InvalidInput(msg) => validation_error(msg),
        Error::Conflict(msg) => conflict(msg),
        Error::FeatureDisabled(msg) => feature_disabled(msg),
        other => {
            error!("Internal error: {}", other);
            internal_error("Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape_is_stable() {
        let (status, Json(body)) = validation_error("bad bbox");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["message"], "bad bbox");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn core_errors_map_to_spec_codes() {
        let (status, Json(body)) = map_core_error(hf_core::Error::Conflict("dup".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error.code, "CONFLICT");

        let (status, Json(body)) =
            map_core_error(hf_core::Error::FeatureDisabled("boost".to_string()));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error.code, "FEATURE_DISABLED");

        let (status, _) = map_core_error(hf_core::Error::Storage("disk".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! API error type and its JSON response shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use recordhook_engine::EngineError;
use recordhook_rules::validation::ValidationError;

/// Header carrying the caller's tenant. Authentication happens upstream.
pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug)]
pub enum ApiError {
    MissingTenant,
    /// Malformed request body or query string.
    BadRequest(String),
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingTenant => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    reason: format!("missing {TENANT_HEADER} header"),
                    errors: Vec::new(),
                },
            ),
            ApiError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    reason,
                    errors: Vec::new(),
                },
            ),
            ApiError::Engine(e) => {
                let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                }
                (status, engine_body(e))
            }
        };
        (status, Json(body)).into_response()
    }
}

fn engine_body(e: EngineError) -> ErrorBody {
    match e {
        EngineError::Validation(result) => ErrorBody {
            reason: result.reason().unwrap_or_else(|| "validation failed".into()),
            errors: result.errors,
        },
        EngineError::InvalidCondition(c) => ErrorBody {
            reason: c.to_string(),
            errors: vec![ValidationError {
                path: c.path().to_string(),
                message: c.to_string(),
                suggestion: None,
            }],
        },
        // Storage details stay in the server log.
        EngineError::Store(s) if s.status_code() >= 500 => ErrorBody {
            reason: "storage error".into(),
            errors: Vec::new(),
        },
        other => ErrorBody {
            reason: other.to_string(),
            errors: Vec::new(),
        },
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use ulid::Ulid;

use crate::engine::EngineError;

use super::dto::SpanView;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed request: unparseable body, path or query.
    #[error("{0}")]
    BadRequest(String),
}

/// JSON error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub booking_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub conflict: Option<SpanView>,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Engine(e) => match e {
                EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                EngineError::InvalidRange { .. } => (StatusCode::BAD_REQUEST, "invalid_range"),
                EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "limit_exceeded"),
                EngineError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
                EngineError::InvariantViolation { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation")
                }
            },
        }
    }

    fn body(&self) -> ErrorBody {
        let (_, kind) = self.status_and_kind();
        let mut body = ErrorBody {
            error: kind.into(),
            message: self.to_string(),
            booking_id: None,
            conflict: None,
        };
        match self {
            ApiError::Engine(EngineError::Conflict { id, span }) => {
                let view = SpanView::from(*span);
                body.message = format!(
                    "overlaps booking {id} from {} to {}",
                    view.starttime.to_rfc3339(),
                    view.endtime.to_rfc3339()
                );
                body.booking_id = Some(*id);
                body.conflict = Some(view);
            }
            ApiError::Engine(EngineError::NotFound(id)) => body.booking_id = Some(*id),
            // Internal details stay in the log.
            ApiError::Engine(EngineError::Storage(_)) => {
                body.message = "storage unavailable".into();
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_kind();
        match &self {
            _ if status.is_server_error() => error!("request failed: {self}"),
            ApiError::Engine(_) => warn!("request rejected: {self}"),
            ApiError::BadRequest(_) => debug!("malformed request: {self}"),
        }
        (status, Json(self.body())).into_response()
    }
}

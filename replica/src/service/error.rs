use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use comms::ErrorBody;

use crate::error::{InvalidParams, ModelErr};

/// Failures of a request handler, rendered as an `ErrorBody`.
#[derive(Debug)]
pub enum ApiError {
    Model(ModelErr),
    InvalidRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Model(ModelErr::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Model(e) => ErrorBody {
                kind: e.kind().to_string(),
                detail: e.to_string(),
            },
            Self::InvalidRequest(detail) => ErrorBody {
                kind: "invalid_request".to_string(),
                detail: detail.clone(),
            },
        }
    }
}

impl From<ModelErr> for ApiError {
    fn from(value: ModelErr) -> Self {
        Self::Model(value)
    }
}

impl From<InvalidParams> for ApiError {
    fn from(value: InvalidParams) -> Self {
        Self::InvalidRequest(value.0)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flamydash_types::{ErrorBody, ErrorCode};
use thiserror::Error;

use crate::analytics::IntakeError;
use crate::responder::ConfigError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error("Game not found")]
    GameNotFound { game_id: String },
    #[error("Not found")]
    NotFound { path: String },
    #[error("Internal server error")]
    Internal {
        detail: String,
        /// Whether `detail` may be shown to the caller.
        expose: bool,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Config(ConfigError::GameNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Config(ConfigError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Config(_) => StatusCode::BAD_REQUEST,
            ApiError::Intake(IntakeError::MissingFields) => StatusCode::BAD_REQUEST,
            ApiError::Intake(IntakeError::Recording(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::GameNotFound { .. } | ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Config(err) => err.code(),
            ApiError::Intake(IntakeError::MissingFields) => ErrorCode::MissingFields,
            ApiError::Intake(IntakeError::Recording(_)) => ErrorCode::RecordingError,
            ApiError::GameNotFound { .. } => ErrorCode::GameNotFound,
            ApiError::NotFound { .. } => ErrorCode::NotFound,
            ApiError::Internal { .. } => ErrorCode::ServerError,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error = match self {
            ApiError::Config(ConfigError::Signing(_)) => "Internal server error".to_string(),
            ApiError::Intake(IntakeError::Recording(_)) => "Failed to record event".to_string(),
            other => other.to_string(),
        };
        let mut body = ErrorBody::new(self.code(), error);
        match self {
            ApiError::GameNotFound { game_id } => body.game_id = Some(game_id.clone()),
            ApiError::NotFound { path } => body.path = Some(path.clone()),
            ApiError::Internal { detail, expose } => {
                body.message = Some(if *expose {
                    detail.clone()
                } else {
                    "Something went wrong".to_string()
                });
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = %self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = %self.code(), "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flamydash_types::DecodeError;

    #[test]
    fn statuses_and_codes() {
        let cases = [
            (
                ApiError::from(ConfigError::MissingParams),
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingParams,
            ),
            (
                ApiError::from(ConfigError::InvalidFormat(DecodeError::Empty)),
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidParams,
            ),
            (
                ApiError::from(ConfigError::Expired),
                StatusCode::BAD_REQUEST,
                ErrorCode::ExpiredRequest,
            ),
            (
                ApiError::from(ConfigError::GameNotFound("x".to_string())),
                StatusCode::NOT_FOUND,
                ErrorCode::GameNotFound,
            ),
            (
                ApiError::from(IntakeError::MissingFields),
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingFields,
            ),
            (
                ApiError::NotFound { path: "/x".to_string() },
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(ApiError::from(ConfigError::Expired).body().error, "Request expired");
        assert_eq!(
            ApiError::from(ConfigError::InvalidFormat(DecodeError::Empty)).body().error,
            "Invalid parameter format"
        );
    }

    #[test]
    fn internal_detail_only_when_exposed() {
        let hidden = ApiError::Internal {
            detail: "boom".to_string(),
            expose: false,
        };
        assert_eq!(hidden.body().message.as_deref(), Some("Something went wrong"));
        let shown = ApiError::Internal {
            detail: "boom".to_string(),
            expose: true,
        };
        assert_eq!(shown.body().message.as_deref(), Some("boom"));
        assert_eq!(shown.body().code, ErrorCode::ServerError);
    }
}

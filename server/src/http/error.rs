use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use common::error::PipelineError;

// wraps the engine taxonomy so axum handlers can use `?`
pub struct AppError(pub PipelineError);

impl<E> From<E> for AppError
where
    E: Into<PipelineError>,
{
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            message: String,
        }

        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // the body message stays generic; the interesting part goes to logs
        match self.0.detail() {
            Some(detail) => error!({status = %status, error = %self.0, detail = detail}, "request failed"),
            None => warn!({status = %status, error = %self.0}, "request failed"),
        }

        (
            status,
            Json(ErrorResponse {
                error: status.as_u16().to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

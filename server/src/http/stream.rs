use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use http::{
    HeaderMap, HeaderValue,
    header::{CONTENT_DISPOSITION, CONTENT_TYPE},
};
use tracing::{debug, instrument};

use crate::http::{AppError, svc::ServerState};
use common::error::PipelineError;

// pipeline download
//
// this is the engine's single real endpoint: resolve the token, run the
// chain, and stream the one resulting file out with headers taken from its
// metadata.  by the time the first body byte leaves, upstream workers may
// still be producing later chunks.
#[instrument(skip_all)]
pub(super) async fn run_pipeline(
    State(state): State<Arc<ServerState>>,
    Path(token_id): Path<String>,
) -> Result<Response, AppError> {
    debug!("serving pipeline request");

    let output = state.executor.run(&token_id).await?;
    let metadata = output.metadata().clone();

    let mut headers = HeaderMap::new();

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(metadata.media_type())
            .map_err(|err| PipelineError::Internal(err.to_string()))?,
    );

    // downloads get an attachment disposition; inline renders (validation
    // reports, previews) do not
    if metadata.download() {
        let file_name = metadata.file_name_or("output");

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
                .map_err(|err| PipelineError::Internal(err.to_string()))?,
        );
    }

    let body = Body::from_stream(output.into_stream());

    Ok((StatusCode::OK, headers, body).into_response())
}

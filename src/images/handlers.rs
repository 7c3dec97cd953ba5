use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::instrument;

use super::services::{asset_key, image_exists, presign_upload, UPLOAD_PREFIX};
use crate::error::AppError;
use crate::state::AppState;

/// Upload URLs for object-store backends: 307 to a short-lived presigned URL.
pub fn routes() -> Router<AppState> {
    Router::new().route("/uploads/:name", get(redirect_upload))
}

#[instrument(skip(state))]
pub async fn redirect_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let reference = format!("{}{}", UPLOAD_PREFIX, name);
    let Some(key) = asset_key(&reference) else {
        return Err(AppError::NotFound);
    };
    if !image_exists(&state, &reference).await? {
        return Err(AppError::NotFound);
    }
    let url = presign_upload(&state, key).await?;
    Ok(Redirect::temporary(&url).into_response())
}

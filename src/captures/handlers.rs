use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{instrument, warn};

use super::{
    dto::Base64Capture,
    services::{decode_image_payload, store_capture, StoredCapture, MAX_CAPTURE_BYTES},
    CaptureError,
};
use crate::{auth::AuthUser, error::ApiError, nutrition::handlers::IMAGE_BODY_LIMIT, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/captures", post(upload_multipart))
        .route("/captures/base64", post(upload_base64))
        .layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CaptureError::TooLarge.into()
    } else {
        ApiError::Validation(e.body_text())
    }
}

/// POST /captures, multipart with a single `file` field.
#[instrument(skip(state, mp))]
pub async fn upload_multipart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<StoredCapture>), ApiError> {
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.len() > MAX_CAPTURE_BYTES {
            warn!(%user_id, size = data.len(), "capture too large");
            return Err(CaptureError::TooLarge.into());
        }
        let stored = store_capture(state.storage.as_ref(), user_id, data, &content_type).await?;
        return Ok((StatusCode::CREATED, Json(stored)));
    }
    Err(CaptureError::Missing.into())
}

/// POST /captures/base64 `{ image, content_type? }`
#[instrument(skip(state, body))]
pub async fn upload_base64(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<Base64Capture>,
) -> Result<(StatusCode, Json<StoredCapture>), ApiError> {
    let (content_type, data) = decode_image_payload(&body.image, body.content_type.as_deref())?;
    let stored = store_capture(state.storage.as_ref(), user_id, data, &content_type).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

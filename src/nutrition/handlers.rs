use axum::{
    extract::{DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{Estimate, ImageInput};
use crate::{
    auth::AuthUser,
    captures::{services::decode_image_payload, MAX_CAPTURE_BYTES},
    error::ApiError,
    state::AppState,
};

/// Room for a base64 image of the maximum size plus JSON framing.
pub const IMAGE_BODY_LIMIT: usize = MAX_CAPTURE_BYTES / 3 * 4 + 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// `image` is a data URL, or bare base64 when `content_type` is given.
#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub image: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl ImageRequest {
    pub fn into_input(self) -> Result<ImageInput, ApiError> {
        let (content_type, bytes) = decode_image_payload(&self.image, self.content_type.as_deref())?;
        if !content_type.starts_with("image/") {
            return Err(ApiError::Validation(format!("{content_type} is not an image")));
        }
        Ok(ImageInput::from_bytes(content_type, &bytes))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/estimate/text", post(estimate_text))
        .route(
            "/estimate/image",
            post(estimate_image).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
}

#[instrument(skip(state, body))]
pub async fn estimate_text(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<TextRequest>,
) -> Result<Json<Estimate>, ApiError> {
    let estimate = state.estimator.estimate_text(&body.text).await?;
    info!(%user_id, items = estimate.items.len(), source = ?estimate.source, "text estimated");
    Ok(Json(estimate))
}

#[instrument(skip(state, body))]
pub async fn estimate_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ImageRequest>,
) -> Result<Json<Estimate>, ApiError> {
    let image = body.into_input()?;
    let estimate = state.estimator.estimate_image(&image).await?;
    info!(%user_id, items = estimate.items.len(), "image estimated");
    Ok(Json(estimate))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::app::build_app;
    use crate::state::AppState;
    use crate::testing::{call, token_for};

    #[tokio::test]
    async fn text_estimate_uses_local_dictionary() {
        let state = AppState::fake();
        let token = token_for(&state, uuid::Uuid::new_v4());
        let app = build_app(state);

        let (status, body) = call(
            app,
            "POST",
            "/api/v1/estimate/text",
            Some(&token),
            json!({ "text": "2 eggs and 1 banana" }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["source"], "local_heuristic");
        assert_eq!(body["items"][0]["name"], "Egg");
        assert_eq!(body["items"][0]["calories"], 156);
        assert_eq!(body["items"][1]["calories"], 105);
    }

    #[tokio::test]
    async fn estimate_errors_are_typed() {
        let state = AppState::fake();
        let token = token_for(&state, uuid::Uuid::new_v4());
        let app = build_app(state);

        let (status, body) = call(
            app.clone(),
            "POST",
            "/api/v1/estimate/text",
            Some(&token),
            json!({ "text": "mystery" }),
        )
        .await;
        assert_eq!(status, 422);
        assert_eq!(body["kind"], "no_match");
        assert_eq!(body["retryable"], false);

        let (status, body) = call(
            app.clone(),
            "POST",
            "/api/v1/estimate/image",
            Some(&token),
            json!({ "image": "data:image/png;base64,iVBORw==" }),
        )
        .await;
        assert_eq!(status, 503);
        assert_eq!(body["kind"], "missing_credentials");

        let (status, _): (u16, Value) = call(
            app,
            "POST",
            "/api/v1/estimate/image",
            Some(&token),
            json!({ "image": "data:text/plain;base64,aGk=" }),
        )
        .await;
        assert_eq!(status, 400);
    }
}

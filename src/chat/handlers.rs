use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::dto::{ChatTextRequest, ChatTurnResponse, TranscriptResponse};
use crate::{
    auth::AuthUser,
    error::ApiError,
    nutrition::handlers::{ImageRequest, IMAGE_BODY_LIMIT},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/chat/messages",
            get(get_messages).post(post_message).delete(clear_messages),
        )
        .route(
            "/chat/image",
            post(post_image).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
}

#[instrument(skip(state))]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<TranscriptResponse> {
    Json(TranscriptResponse {
        messages: state.chats.messages(user_id).await,
        pending: state.chats.is_busy(user_id).await,
    })
}

#[instrument(skip(state, body))]
pub async fn post_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ChatTextRequest>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
    let turn = state.chats.submit_text(user_id, &body.text).await?;
    Ok(Json(turn.into()))
}

#[instrument(skip(state, body))]
pub async fn post_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ImageRequest>,
) -> Result<Json<ChatTurnResponse>, ApiError> {
    let image = body.into_input()?;
    let turn = state.chats.submit_image(user_id, &image).await?;
    Ok(Json(turn.into()))
}

#[instrument(skip(state))]
pub async fn clear_messages(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> StatusCode {
    state.chats.clear(user_id).await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::app::build_app;
    use crate::state::AppState;
    use crate::testing::{call, token_for};

    #[tokio::test]
    async fn chat_round_trip() {
        let state = AppState::fake();
        let token = token_for(&state, Uuid::new_v4());
        let app = build_app(state);

        let (status, turn) = call(
            app.clone(),
            "POST",
            "/api/v1/chat/messages",
            Some(&token),
            json!({ "text": "a slice of pizza and a coke" }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(turn["total_calories"], 425);
        assert_eq!(turn["estimate"]["source"], "local_heuristic");
        assert_eq!(turn["messages"][1]["role"], "assistant");
        assert_eq!(turn["messages"][1]["content"], "Pizza, Soda\n425 kcal");

        let (status, transcript) = call(app.clone(), "GET", "/api/v1/chat/messages", Some(&token), Value::Null).await;
        assert_eq!(status, 200);
        assert_eq!(transcript["messages"].as_array().unwrap().len(), 2);
        assert_eq!(transcript["pending"], false);

        let (status, _) = call(app.clone(), "DELETE", "/api/v1/chat/messages", Some(&token), Value::Null).await;
        assert_eq!(status, 204);
        let (_, transcript) = call(app, "GET", "/api/v1/chat/messages", Some(&token), Value::Null).await;
        assert!(transcript["messages"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_without_credentials_is_reported_in_transcript() {
        let state = AppState::fake();
        let token = token_for(&state, Uuid::new_v4());
        let app = build_app(state);

        let (status, body) = call(
            app.clone(),
            "POST",
            "/api/v1/chat/image",
            Some(&token),
            json!({ "image": "iVBORw==", "content_type": "image/png" }),
        )
        .await;
        assert_eq!(status, 503);
        assert_eq!(body["retryable"], false);

        let (_, transcript) = call(app, "GET", "/api/v1/chat/messages", Some(&token), Value::Null).await;
        let messages = transcript["messages"].as_array().unwrap();
        assert_eq!(messages[0]["content"], "Analyzing food image...");
        assert_eq!(messages[1]["role"], "assistant");
    }
}

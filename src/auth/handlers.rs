use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
    jwt::{AuthUser, JwtKeys},
    password::{hash_password, is_valid_email, verify_password, MIN_PASSWORD_LEN},
    repo::User,
};
use crate::{error::ApiError, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let keys = JwtKeys::from_ref(state);
    Ok(AuthResponse {
        access_token: keys.sign_access(user.id)?,
        refresh_token: keys.sign_refresh(user.id)?,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let hash = hash_password(&payload.password)?;
    let Some(user) = state.users.create(&payload.email, &hash).await? else {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("email already registered".into()));
    };

    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("invalid credentials".into());

    let Some(user) = state.users.find_by_email(&payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(invalid());
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = %user.id, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = JwtKeys::from_ref(&state)
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    let user = load_user(&state, claims.sub).await?;
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    Ok(Json(load_user(&state, user_id).await?.into()))
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<User, ApiError> {
    state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user not found".into()))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::app::build_app;
    use crate::state::AppState;
    use crate::testing::call;

    #[tokio::test]
    async fn register_login_refresh_me() {
        let app = build_app(AppState::fake());
        let creds = json!({ "email": " Ann@Example.com ", "password": "oatmeal-123" });

        let (status, body) = call(app.clone(), "POST", "/api/v1/auth/register", None, creds.clone()).await;
        assert_eq!(status, 201);
        assert_eq!(body["user"]["email"], "ann@example.com");

        let (status, body) = call(app.clone(), "POST", "/api/v1/auth/register", None, creds.clone()).await;
        assert_eq!(status, 409);
        assert_eq!(body["kind"], "conflict");

        let (status, body) = call(app.clone(), "POST", "/api/v1/auth/login", None, creds).await;
        assert_eq!(status, 200);
        let access = body["access_token"].as_str().unwrap().to_string();
        let refresh = body["refresh_token"].as_str().unwrap().to_string();

        let (status, me) = call(app.clone(), "GET", "/api/v1/me", Some(&access), Value::Null).await;
        assert_eq!(status, 200);
        assert_eq!(me["email"], "ann@example.com");

        // A refresh token is not an access token.
        let (status, _) = call(app.clone(), "GET", "/api/v1/me", Some(&refresh), Value::Null).await;
        assert_eq!(status, 401);

        let (status, body) = call(
            app,
            "POST",
            "/api/v1/auth/refresh",
            None,
            json!({ "refresh_token": refresh }),
        )
        .await;
        assert_eq!(status, 200);
        assert!(body["access_token"].is_string());
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let app = build_app(AppState::fake());
        let (status, _) = call(
            app.clone(),
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "email": "not-an-email", "password": "long-enough" }),
        )
        .await;
        assert_eq!(status, 400);

        let (status, _) = call(
            app.clone(),
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "email": "bob@example.com", "password": "short" }),
        )
        .await;
        assert_eq!(status, 400);

        let (status, body) = call(
            app,
            "POST",
            "/api/v1/auth/login",
            None,
            json!({ "email": "nobody@example.com", "password": "whatever1" }),
        )
        .await;
        assert_eq!(status, 401);
        assert_eq!(body["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let app = build_app(AppState::fake());
        let (status, _) = call(app.clone(), "GET", "/api/v1/me", None, Value::Null).await;
        assert_eq!(status, 401);
        let (status, _) = call(app, "GET", "/api/v1/logs/today", Some("garbage"), Value::Null).await;
        assert_eq!(status, 401);
    }
}

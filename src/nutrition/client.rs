//! HTTP clients for the hosted models.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{EstimationError, ImageInput};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest upstream error body echoed back in an error.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPrompt {
    pub system: String,
    pub user_text: String,
    pub image: Option<ImageInput>,
}

/// A chat model that answers a prompt with free text.
#[async_trait]
pub trait NutritionModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &ModelPrompt) -> Result<String, EstimationError>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, EstimationError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .build()
        .map_err(|e| EstimationError::Transport(e.to_string()))
}

fn map_reqwest(e: reqwest::Error) -> EstimationError {
    if e.is_timeout() {
        EstimationError::Timeout
    } else {
        EstimationError::Transport(e.to_string())
    }
}

async fn send_json(req: reqwest::RequestBuilder, body: &Value) -> Result<Value, EstimationError> {
    let res = req.json(body).send().await.map_err(map_reqwest)?;
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        let message: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(EstimationError::Status {
            status: status.as_u16(),
            message,
        });
    }
    res.json::<Value>().await.map_err(map_reqwest)
}

fn missing_text(provider: &str) -> EstimationError {
    EstimationError::Transport(format!("{provider} response had no text content"))
}

/// Any `/chat/completions` endpoint: OpenRouter, OpenAI, local gateways.
pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    text_model: String,
    vision_model: String,
}

impl OpenAiCompatibleModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EstimationError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            text_model: text_model.into(),
            vision_model: vision_model.into(),
        })
    }

    fn body(&self, prompt: &ModelPrompt) -> Value {
        let (model, user_content) = match &prompt.image {
            Some(image) => (
                &self.vision_model,
                json!([
                    { "type": "text", "text": prompt.user_text },
                    { "type": "image_url", "image_url": { "url": image.data_url() } }
                ]),
            ),
            None => (&self.text_model, json!(prompt.user_text)),
        };
        json!({
            "model": model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": user_content }
            ]
        })
    }
}

#[async_trait]
impl NutritionModel for OpenAiCompatibleModel {
    fn name(&self) -> &'static str {
        "openai_compatible"
    }

    async fn complete(&self, prompt: &ModelPrompt) -> Result<String, EstimationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, vision = prompt.image.is_some(), "chat completion request");
        let req = self.http.post(&url).bearer_auth(&self.api_key);
        let value = send_json(req, &self.body(prompt)).await?;
        value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing_text(self.name()))
    }
}

/// Google Gemini `generateContent`.
pub struct GeminiModel {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    text_model: String,
    vision_model: String,
}

impl GeminiModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        text_model: impl Into<String>,
        vision_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EstimationError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            text_model: text_model.into(),
            vision_model: vision_model.into(),
        })
    }

    fn body(prompt: &ModelPrompt) -> Value {
        let mut parts = vec![json!({ "text": prompt.user_text })];
        if let Some(image) = &prompt.image {
            parts.push(json!({
                "inline_data": { "mime_type": image.mime_type, "data": image.data_base64 }
            }));
        }
        json!({
            "system_instruction": { "parts": [{ "text": prompt.system }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": 0.2 }
        })
    }
}

#[async_trait]
impl NutritionModel for GeminiModel {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, prompt: &ModelPrompt) -> Result<String, EstimationError> {
        let model = if prompt.image.is_some() {
            &self.vision_model
        } else {
            &self.text_model
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(%url, vision = prompt.image.is_some(), "gemini request");
        let req = self.http.post(&url).header("x-goog-api-key", &self.api_key);
        let value = send_json(req, &Self::body(prompt)).await?;

        let parts = value
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| missing_text(self.name()))?;
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect();
        if text.is_empty() {
            return Err(missing_text(self.name()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    #[derive(Clone, Default)]
    struct Seen {
        body: Arc<Mutex<Option<Value>>>,
        auth: Arc<Mutex<Option<String>>>,
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn prompt(image: Option<ImageInput>) -> ModelPrompt {
        ModelPrompt {
            system: "system".into(),
            user_text: "2 eggs".into(),
            image,
        }
    }

    #[tokio::test]
    async fn openai_sends_bearer_and_reads_content() {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    *seen.auth.lock().unwrap() = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *seen.body.lock().unwrap() = Some(body);
                    Json(json!({ "choices": [{ "message": { "content": "[]" } }] }))
                }),
            )
            .with_state(seen.clone());
        let base = serve(app).await;

        let model = OpenAiCompatibleModel::new(&base, "k-123", "text-m", "vision-m", Duration::from_secs(5)).unwrap();
        let image = ImageInput::from_bytes("image/png", b"png");
        let reply = model.complete(&prompt(Some(image.clone()))).await.unwrap();
        assert_eq!(reply, "[]");

        assert_eq!(seen.auth.lock().unwrap().as_deref(), Some("Bearer k-123"));
        let body = seen.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "vision-m");
        assert_eq!(body["messages"][1]["content"][1]["image_url"]["url"], image.data_url());
    }

    #[tokio::test]
    async fn gemini_sends_inline_data_and_joins_parts() {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/models/:model",
                post(|State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    *seen.auth.lock().unwrap() = headers
                        .get("x-goog-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *seen.body.lock().unwrap() = Some(body);
                    Json(json!({
                        "candidates": [{ "content": { "parts": [{ "text": "[{\"name\":" }, { "text": "\"Egg\",\"calories\":78}]" }] } }]
                    }))
                }),
            )
            .with_state(seen.clone());
        let base = serve(app).await;

        let model = GeminiModel::new(&base, "g-key", "flash", "flash", Duration::from_secs(5)).unwrap();
        let image = ImageInput::from_bytes("image/jpeg", b"jpg");
        let reply = model.complete(&prompt(Some(image.clone()))).await.unwrap();
        assert_eq!(reply, r#"[{"name":"Egg","calories":78}]"#);

        assert_eq!(seen.auth.lock().unwrap().as_deref(), Some("g-key"));
        let body = seen.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["data"], image.data_base64);
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "system");
    }

    #[tokio::test]
    async fn upstream_errors_are_typed() {
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
            );
        let base = serve(app).await;
        let model = OpenAiCompatibleModel::new(&base, "k", "t", "v", Duration::from_secs(5)).unwrap();
        let err = model.complete(&prompt(None)).await.unwrap_err();
        assert!(matches!(err, EstimationError::Status { status: 429, ref message } if message == "rate limited"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let base = serve(app).await;
        let model = OpenAiCompatibleModel::new(&base, "k", "t", "v", Duration::from_millis(200)).unwrap();
        let err = model.complete(&prompt(None)).await.unwrap_err();
        assert!(matches!(err, EstimationError::Timeout));
    }

    #[tokio::test]
    async fn missing_content_is_reported() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base = serve(app).await;
        let model = OpenAiCompatibleModel::new(&base, "k", "t", "v", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            model.complete(&prompt(None)).await,
            Err(EstimationError::Transport(_))
        ));
    }
}

//! Nutrition estimation: turns a free-text description or a food photo into
//! a list of food items with calories, protein and serving size.

pub mod client;
pub mod extract;
pub mod handlers;
pub mod local;
pub mod retry;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::log::model::{sum_calories, NewFoodItem};
pub use client::{GeminiModel, ModelPrompt, NutritionModel, OpenAiCompatibleModel};
pub use extract::{parse_food_reply, ParseError};
pub use local::LocalEstimator;
pub use retry::{with_retry, RetryPolicy};

pub const TEXT_SYSTEM_PROMPT: &str = "You are a nutrition assistant. The user describes what they ate. \
Reply with ONLY a JSON array, no prose. Each element must be an object \
{\"name\": string, \"calories\": number, \"protein\": number (grams), \"serving\": string}. \
Use one element per distinct food and scale values to the stated quantity. \
If the text mentions no food, reply with [].";

pub const IMAGE_SYSTEM_PROMPT: &str = "You are a nutrition assistant. The user sends a photo of a meal. \
Reply with ONLY a JSON array, no prose, following the format the user asks for.";

pub const IMAGE_PROMPT: &str = "Identify every food visible in this photo and estimate its portion. \
Reply with ONLY a JSON array, no prose. Each element must be an object \
{\"name\": string, \"calories\": number, \"protein\": number (grams), \"serving\": string}. \
If there is no food in the photo, reply with [].";

/// Upper bound on a text description sent to a model.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEstimate {
    pub name: String,
    pub calories: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving: Option<String>,
}

impl FoodEstimate {
    pub fn into_new_food_item(self) -> NewFoodItem {
        NewFoodItem {
            name: self.name,
            calories: self.calories,
            protein: self.protein,
            serving: self.serving,
            image: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    Model,
    /// Dictionary lookup; values are rough and should be reviewed.
    LocalHeuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub items: Vec<FoodEstimate>,
    pub source: EstimateSource,
}

impl Estimate {
    pub fn total_calories(&self) -> u32 {
        sum_calories(self.items.iter().map(|i| i.calories))
    }

    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.items.iter().map(|i| i.name.as_str()).collect();
        format!("{}\n{} kcal", names.join(", "), self.total_calories())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    #[error("no AI credentials configured")]
    MissingCredentials,
    #[error("nothing to analyze")]
    EmptyInput,
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("model request timed out")]
    Timeout,
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not read model reply: {0}")]
    Malformed(#[from] ParseError),
    #[error("no foods recognized")]
    NoMatch,
}

impl EstimationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EstimationError::Timeout | EstimationError::Transport(_) => true,
            EstimationError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EstimationError::MissingCredentials => "missing_credentials",
            EstimationError::EmptyInput => "empty_input",
            EstimationError::InvalidImage(_) => "invalid_image",
            EstimationError::Timeout => "timeout",
            EstimationError::Transport(_) => "transport",
            EstimationError::Status { .. } => "upstream_status",
            EstimationError::Malformed(_) => "malformed_reply",
            EstimationError::NoMatch => "no_match",
        }
    }
}

/// A base64-encoded image with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data_base64: String,
}

impl ImageInput {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: B64.encode(bytes),
        }
    }

    /// Parses `data:image/png;base64,....`.
    pub fn from_data_url(url: &str) -> Result<Self, EstimationError> {
        let invalid = |m: &str| EstimationError::InvalidImage(m.to_string());
        let rest = url.trim().strip_prefix("data:").ok_or_else(|| invalid("not a data URL"))?;
        let (meta, data) = rest.split_once(',').ok_or_else(|| invalid("missing payload"))?;
        let mime_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| invalid("payload is not base64"))?;
        if !mime_type.starts_with("image/") {
            return Err(invalid("not an image"));
        }
        let data = data.trim();
        if data.is_empty() {
            return Err(EstimationError::EmptyInput);
        }
        B64.decode(data).map_err(|_| invalid("payload is not valid base64"))?;
        Ok(Self {
            mime_type: mime_type.to_string(),
            data_base64: data.to_string(),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// Entry point for estimation. Calls the configured model with retries, or
/// falls back to the local dictionary for text when no model is configured.
#[derive(Clone)]
pub struct Estimator {
    model: Option<Arc<dyn NutritionModel>>,
    local: LocalEstimator,
    retry: RetryPolicy,
}

impl Estimator {
    pub fn new(model: Option<Arc<dyn NutritionModel>>, retry: RetryPolicy) -> Self {
        Self {
            model,
            local: LocalEstimator,
            retry,
        }
    }

    pub fn local_only() -> Self {
        Self::new(None, RetryPolicy::default())
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    #[instrument(skip_all, fields(chars = description.len()))]
    pub async fn estimate_text(&self, description: &str) -> Result<Estimate, EstimationError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(EstimationError::EmptyInput);
        }
        let description: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();

        let Some(model) = &self.model else {
            let items = self.local.estimate(&description);
            info!(items = items.len(), "local estimate");
            return finish(items, EstimateSource::LocalHeuristic);
        };

        let prompt = ModelPrompt {
            system: TEXT_SYSTEM_PROMPT.to_string(),
            user_text: description,
            image: None,
        };
        let items = self.ask(model.as_ref(), &prompt).await?;
        finish(items, EstimateSource::Model)
    }

    #[instrument(skip_all, fields(mime = %image.mime_type))]
    pub async fn estimate_image(&self, image: &ImageInput) -> Result<Estimate, EstimationError> {
        if image.data_base64.is_empty() {
            return Err(EstimationError::EmptyInput);
        }
        let model = self.model.as_ref().ok_or(EstimationError::MissingCredentials)?;
        let prompt = ModelPrompt {
            system: IMAGE_SYSTEM_PROMPT.to_string(),
            user_text: IMAGE_PROMPT.to_string(),
            image: Some(image.clone()),
        };
        let items = self.ask(model.as_ref(), &prompt).await?;
        finish(items, EstimateSource::Model)
    }

    async fn ask(
        &self,
        model: &dyn NutritionModel,
        prompt: &ModelPrompt,
    ) -> Result<Vec<FoodEstimate>, EstimationError> {
        let reply = with_retry(self.retry, model.name(), || model.complete(prompt)).await?;
        match parse_food_reply(&reply) {
            Ok(items) => {
                info!(provider = model.name(), items = items.len(), "model estimate");
                Ok(items)
            }
            Err(e) => {
                warn!(provider = model.name(), error = %e, reply_len = reply.len(), "unreadable model reply");
                Err(e.into())
            }
        }
    }
}

fn finish(items: Vec<FoodEstimate>, source: EstimateSource) -> Result<Estimate, EstimationError> {
    if items.is_empty() {
        return Err(EstimationError::NoMatch);
    }
    Ok(Estimate { items, source })
}

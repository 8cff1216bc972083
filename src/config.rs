use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::log::model::{Goals, DEFAULT_CALORIE_GOAL, DEFAULT_PROTEIN_GOAL};
use crate::nutrition::client::{GEMINI_BASE_URL, OPENROUTER_BASE_URL};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Where food records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStoreKind {
    Postgres,
    File,
    /// Postgres with a local file mirror used when the database is unreachable.
    Cached,
}

impl FromStr for RecordStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "file" => Ok(Self::File),
            "cached" => Ok(Self::Cached),
            other => anyhow::bail!("unknown RECORD_STORE {other:?} (expected postgres, file or cached)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenRouter,
    Gemini,
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" | "openai" => Ok(Self::OpenRouter),
            "gemini" => Ok(Self::Gemini),
            other => anyhow::bail!("unknown AI_PROVIDER {other:?} (expected openrouter or gemini)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub provider: AiProvider,
    /// No key means text estimates use the local dictionary and image
    /// estimates are unavailable.
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub record_store: RecordStoreKind,
    pub record_dir: String,
    pub storage: StorageConfig,
    pub ai: AiConfig,
    pub default_goals: Goals,
    pub host: String,
    pub port: u16,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={v:?}: {e}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: var_or("JWT_ISSUER", "nutrical"),
            audience: var_or("JWT_AUDIENCE", "nutrical-users"),
            ttl_minutes: parse_or("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: parse_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };

        // Accounts always live in Postgres; RECORD_STORE only moves food records.
        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let record_store: RecordStoreKind = parse_or("RECORD_STORE", RecordStoreKind::Postgres)?;

        let storage = StorageConfig {
            endpoint: var("MINIO_ENDPOINT").context("MINIO_ENDPOINT must be set")?,
            bucket: var("MINIO_BUCKET").context("MINIO_BUCKET must be set")?,
            access_key: var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY must be set")?,
            secret_key: var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY must be set")?,
            region: var_or("MINIO_REGION", "us-east-1"),
        };

        let provider: AiProvider = parse_or("AI_PROVIDER", AiProvider::OpenRouter)?;
        let (default_base, default_text, default_vision) = match provider {
            AiProvider::OpenRouter => (
                OPENROUTER_BASE_URL,
                "meta-llama/llama-3.3-70b-instruct",
                "google/gemini-2.0-flash-001",
            ),
            AiProvider::Gemini => (GEMINI_BASE_URL, "gemini-2.0-flash", "gemini-2.0-flash"),
        };
        let ai = AiConfig {
            provider,
            api_key: var("AI_API_KEY"),
            base_url: var_or("AI_BASE_URL", default_base),
            text_model: var_or("AI_TEXT_MODEL", default_text),
            vision_model: var_or("AI_VISION_MODEL", default_vision),
            timeout: Duration::from_secs(parse_or("AI_TIMEOUT_SECS", 15u64)?),
            max_attempts: parse_or("AI_MAX_ATTEMPTS", 3u32)?.max(1),
        };

        let default_goals = Goals {
            calorie_goal: parse_or("DEFAULT_CALORIE_GOAL", DEFAULT_CALORIE_GOAL)?,
            protein_goal: parse_or("DEFAULT_PROTEIN_GOAL", DEFAULT_PROTEIN_GOAL)?,
        };
        if default_goals.calorie_goal == 0 || default_goals.protein_goal == 0 {
            anyhow::bail!("default goals must be positive");
        }

        Ok(Self {
            database_url,
            jwt,
            record_store,
            record_dir: var_or("RECORD_DIR", "./data/records"),
            storage,
            ai,
            default_goals,
            host: var_or("APP_HOST", "0.0.0.0"),
            port: parse_or("APP_PORT", 8080)?,
        })
    }
}

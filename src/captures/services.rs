use anyhow::Context;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::CaptureError;
use crate::storage::StorageClient;

pub const MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;

/// Lifetime of presigned image URLs.
pub const PRESIGN_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct StoredCapture {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" | "image/heif" => Some("heic"),
        _ => None,
    }
}

/// Canonical MIME type for an accepted image type.
fn normalize_mime(ct: &str) -> String {
    let ct = ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase();
    match ct.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        "image/heif" => "image/heic".to_string(),
        _ => ct,
    }
}

fn prefix_for(user_id: Uuid) -> String {
    format!("captures/{user_id}/")
}

/// True when `key` names an object this user uploaded.
pub fn is_owned_key(user_id: Uuid, key: &str) -> bool {
    key.strip_prefix(&prefix_for(user_id))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/') && !rest.contains(".."))
}

/// Splits `data:image/png;base64,AAAA` into its type and decoded bytes.
/// A bare base64 string is accepted when `fallback_type` is given.
pub fn decode_image_payload(
    payload: &str,
    fallback_type: Option<&str>,
) -> Result<(String, Bytes), CaptureError> {
    let payload = payload.trim();
    let (content_type, data) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',').ok_or(CaptureError::InvalidBase64)?;
            let mime = meta.strip_suffix(";base64").ok_or(CaptureError::InvalidBase64)?;
            (mime.to_string(), data)
        }
        None => (
            fallback_type
                .ok_or_else(|| CaptureError::UnsupportedType("unknown".into()))?
                .to_string(),
            payload,
        ),
    };
    if data.is_empty() {
        return Err(CaptureError::Missing);
    }
    // Cheap bound before decoding: base64 inflates by 4/3.
    if data.len() / 4 * 3 > MAX_CAPTURE_BYTES + 3 {
        return Err(CaptureError::TooLarge);
    }
    let bytes = B64.decode(data).map_err(|_| CaptureError::InvalidBase64)?;
    Ok((content_type, Bytes::from(bytes)))
}

pub async fn store_capture(
    storage: &dyn StorageClient,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
) -> Result<StoredCapture, CaptureError> {
    if body.is_empty() {
        return Err(CaptureError::Missing);
    }
    if body.len() > MAX_CAPTURE_BYTES {
        return Err(CaptureError::TooLarge);
    }
    let content_type = normalize_mime(content_type);
    let ext = ext_from_mime(&content_type)
        .ok_or_else(|| CaptureError::UnsupportedType(content_type.clone()))?;

    let key = format!("{}{}.{}", prefix_for(user_id), Uuid::new_v4(), ext);
    let size = body.len();
    storage
        .put_object(&key, body, &content_type)
        .await
        .with_context(|| format!("put_object {key}"))?;
    let url = presign(storage, &key).await?;

    info!(%user_id, %key, size, "capture stored");
    Ok(StoredCapture {
        key,
        url,
        content_type,
        size,
    })
}

pub async fn presign(storage: &dyn StorageClient, key: &str) -> anyhow::Result<String> {
    storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {key}"))
}

/// Deletes images that belong to `user_id`; failures are logged, not returned.
pub async fn discard_images<I>(storage: &dyn StorageClient, user_id: Uuid, keys: I)
where
    I: IntoIterator<Item = String>,
{
    for key in keys {
        if !is_owned_key(user_id, &key) {
            continue;
        }
        if let Err(e) = storage.delete_object(&key).await {
            warn!(%user_id, %key, error = %e, "failed to delete image");
        }
    }
}

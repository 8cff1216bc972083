//! Camera captures and uploaded food photos.

mod dto;
pub mod handlers;
pub mod services;

pub use handlers::router;
pub use services::{is_owned_key, store_capture, StoredCapture, MAX_CAPTURE_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no image provided")]
    Missing,
    #[error("unsupported image type {0:?} (expected jpeg, png, webp or heic)")]
    UnsupportedType(String),
    #[error("image is larger than {} MB", MAX_CAPTURE_BYTES / (1024 * 1024))]
    TooLarge,
    #[error("image payload is not valid base64")]
    InvalidBase64,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

use serde::Deserialize;

/// `image` is a data URL (`data:image/jpeg;base64,...`), or bare base64
/// when `content_type` is given.
#[derive(Debug, Deserialize)]
pub struct Base64Capture {
    pub image: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

//! Normalized content handed to the responder.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// Base64-encoded image payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Base64 of the raw image bytes.
    pub data: String,
    pub mime_type: String,
}

/// What the ingestion pipeline hands to a responder: optional text, optional
/// image. Transient; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageContent>,
}

impl NormalizedContent {
    /// Plain-text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    /// Image content with an optional caption.
    #[must_use]
    pub fn image(data: &[u8], mime_type: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            text: caption,
            image: Some(ImageContent {
                data: BASE64.encode(data),
                mime_type: mime_type.into(),
            }),
        }
    }

    /// Decode the image payload, if any.
    #[must_use]
    pub fn decode_image(&self) -> Option<Vec<u8>> {
        self.image
            .as_ref()
            .and_then(|image| BASE64.decode(&image.data).ok())
    }

    /// True when there is neither text nor an image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none()
    }
}

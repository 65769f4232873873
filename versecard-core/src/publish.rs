//! Publisher - posts the finished card to a Facebook page.

use std::time::Duration;

use image::ImageFormat;
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Graph API returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub id: String,
    #[serde(default)]
    pub post_id: Option<String>,
}

/// Consumer of the finished card.
pub trait Publisher {
    fn publish(&self, image: &[u8], file_name: &str, caption: &str) -> Result<PublishReceipt, PublishError>;
}

/// Page photo upload through the Graph API.
pub struct GraphPublisher {
    access_token: String,
    page_id: Option<String>,
    base_url: String,
    version: String,
    timeout: Duration,
}

impl GraphPublisher {
    pub fn new(
        access_token: impl Into<String>,
        page_id: Option<String>,
        base_url: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            page_id,
            base_url: base_url.into(),
            version: version.into(),
            timeout,
        }
    }

    /// Photos edge for the page, or for the token's own node without a page id.
    pub fn photos_url(&self) -> String {
        format!(
            "{}/{}/{}/photos",
            self.base_url.trim_end_matches('/'),
            self.version,
            self.page_id.as_deref().unwrap_or("me"),
        )
    }
}

impl Publisher for GraphPublisher {
    fn publish(&self, image: &[u8], file_name: &str, caption: &str) -> Result<PublishReceipt, PublishError> {
        let source = Part::bytes(image.to_vec())
            .file_name(file_name.to_string())
            .mime_str(image_mime(image, file_name))?;
        let form = Form::new()
            .text("message", caption.to_string())
            .text("access_token", self.access_token.clone())
            .part("source", source);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.post(self.photos_url()).multipart(form).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PublishError::Api { status: status.as_u16(), body });
        }
        Ok(response.json()?)
    }
}

/// Content type from the image bytes, else from the file extension.
pub fn image_mime(image: &[u8], file_name: &str) -> &'static str {
    image::guess_format(image)
        .or_else(|_| ImageFormat::from_path(file_name))
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

// src/capabilities.rs
//! Contracts of the external collaborators the workflows depend on.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::models::ContentType;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CapabilityError>;
}

/// txt2img request in the Automatic1111 payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Txt2ImgConfig {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub sampler_name: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub width: u32,
    pub height: u32,
    pub restore_faces: bool,
    pub batch_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    Bytes(Vec<u8>),
    Base64(String),
}

impl ImagePayload {
    pub fn into_bytes(self) -> Result<Vec<u8>, CapabilityError> {
        match self {
            ImagePayload::Bytes(bytes) => Ok(bytes),
            ImagePayload::Base64(encoded) => {
                // Some servers prefix a data URL header
                let data = encoded
                    .split_once(',')
                    .filter(|(head, _)| head.starts_with("data:"))
                    .map(|(_, data)| data)
                    .unwrap_or(encoded.as_str());
                STANDARD
                    .decode(data.trim())
                    .map_err(|e| CapabilityError::Rejected(format!("Invalid base64 image: {}", e)))
            }
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn text_to_image(&self, config: &Txt2ImgConfig) -> Result<ImagePayload, CapabilityError>;

    /// Whether the backend answers at all.
    async fn is_available(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the bytes and returns a publicly readable URL.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<String, CapabilityError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub kind: ContentType,
    pub image_urls: Vec<String>,
    pub caption: String,
    pub location: String,
    pub alt_text: String,
}

/// Publishes content on the target social network.
#[async_trait]
pub trait Poster: Send + Sync {
    async fn post(&self, request: &PublishRequest) -> Result<(), CapabilityError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str, severity: Severity) -> Result<(), CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_payload_decoding() {
        let payload = ImagePayload::Base64(STANDARD.encode(b"png-bytes"));
        assert_eq!(payload.into_bytes().unwrap(), b"png-bytes".to_vec());

        let payload = ImagePayload::Base64(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(b"abc")
        ));
        assert_eq!(payload.into_bytes().unwrap(), b"abc".to_vec());

        let payload = ImagePayload::Base64("%%%".to_string());
        assert!(matches!(payload.into_bytes(), Err(CapabilityError::Rejected(_))));
    }
}

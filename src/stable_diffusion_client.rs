// src/stable_diffusion_client.rs
// Automatic1111 web UI API client (txt2img)
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::capabilities::{ImageGenerator, ImagePayload, Txt2ImgConfig};
use crate::error::{parse_retry_after, CapabilityError};

#[derive(Debug, Clone)]
pub struct StableDiffusionClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Txt2ImgResponse {
    #[serde(default)]
    pub images: Vec<String>,
}

impl StableDiffusionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for StableDiffusionClient {
    async fn text_to_image(&self, config: &Txt2ImgConfig) -> Result<ImagePayload, CapabilityError> {
        info!(
            "Requesting {}x{} image ({} steps, seed {})",
            config.width, config.height, config.steps, config.seed
        );
        let response = self
            .client
            .post(format!("{}/sdapi/v1/txt2img", self.base_url))
            .timeout(Duration::from_secs(600))
            .json(config)
            .send()
            .await
            .map_err(|e| CapabilityError::from_transport(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status, retry_after, &body));
        }

        let parsed: Txt2ImgResponse = response.json().await.map_err(|e| {
            CapabilityError::Rejected(format!("Failed to parse txt2img response: {}", e))
        })?;
        parsed
            .images
            .into_iter()
            .next()
            .map(ImagePayload::Base64)
            .ok_or_else(|| CapabilityError::Rejected("txt2img returned no images".to_string()))
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/sdapi/v1/memory", self.base_url))
            .timeout(Duration::from_secs(15))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Automatic1111 health check returned {}", response.status());
                false
            }
            Err(e) => {
                warn!("Automatic1111 health check failed: {}", e);
                false
            }
        }
    }
}

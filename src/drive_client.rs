// src/drive_client.rs
// Google Drive v3 uploads, files are shared as publicly viewable
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::capabilities::ObjectStorage;
use crate::error::{parse_retry_after, CapabilityError};

#[derive(Debug, Clone)]
pub struct DriveClient {
    client: Client,
    access_token: String,
    upload_url: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Direct-view URL for a Drive file id.
pub fn public_view_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=view&id={}", file_id)
}

impl DriveClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            upload_url: "https://www.googleapis.com/upload/drive/v3/files".to_string(),
            api_url: "https://www.googleapis.com/drive/v3/files".to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<String, CapabilityError> {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(CapabilityError::from_status(status, retry_after, &body));
        }
        Ok(body)
    }

    async fn share_publicly(&self, file_id: &str) -> Result<(), CapabilityError> {
        let response = self
            .client
            .post(format!("{}/{}/permissions", self.api_url, file_id))
            .bearer_auth(&self.access_token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(|e| CapabilityError::from_transport(&e))?;
        Self::check(response).await.map(|_| ())
    }
}

#[async_trait]
impl ObjectStorage for DriveClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<String, CapabilityError> {
        let mut metadata = json!({ "name": filename });
        if !folder.is_empty() {
            metadata["parents"] = json!([folder]);
        }

        let metadata_part = Part::text(metadata.to_string())
            .mime_str("application/json; charset=UTF-8")
            .map_err(|e| CapabilityError::Rejected(format!("Invalid metadata part: {}", e)))?;
        let file_part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/png")
            .map_err(|e| CapabilityError::Rejected(format!("Invalid file part: {}", e)))?;
        let form = Form::new().part("metadata", metadata_part).part("file", file_part);

        let response = self
            .client
            .post(format!("{}?uploadType=multipart", self.upload_url))
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(120))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CapabilityError::from_transport(&e))?;
        let body = Self::check(response).await?;

        let file: DriveFile = serde_json::from_str(&body).map_err(|e| {
            CapabilityError::Rejected(format!("Failed to parse Drive upload response: {}", e))
        })?;
        self.share_publicly(&file.id).await?;

        info!("Uploaded {} to Drive as {}", filename, file.id);
        Ok(public_view_url(&file.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_view_url() {
        assert_eq!(
            public_view_url("abc123"),
            "https://drive.google.com/uc?export=view&id=abc123"
        );
    }
}

// src/openai_client.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::capabilities::TextGenerator;
use crate::error::{parse_retry_after, CapabilityError};

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(
        &self,
        prompt: &str,
        system_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !system_message.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system_message.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
        }
    }
}

fn first_message(response: ChatResponse) -> Result<String, CapabilityError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| CapabilityError::Rejected("No text content in OpenAI response".to_string()))
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_message: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CapabilityError> {
        let request = self.build_request(prompt, system_message, temperature, max_tokens);
        tracing::debug!(
            "OpenAI request: model {}, {} messages, temperature {}",
            request.model,
            request.messages.len(),
            temperature
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(120))
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::from_transport(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(CapabilityError::from_status(status, retry_after, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            CapabilityError::Rejected(format!("Failed to parse OpenAI response: {}", e))
        })?;
        first_message(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let client = OpenAiClient::new("key".to_string(), "gpt-test".to_string());
        let request = client.build_request("list places", "be brief", 0.9, 400);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-test");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "list places");
        assert_eq!(json["max_tokens"], 400);

        let request = client.build_request("hi", "", 0.7, 10);
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_first_message_extraction() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  hello \n"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_message(response).unwrap(), "hello");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_message(empty), Err(CapabilityError::Rejected(_))));
    }
}

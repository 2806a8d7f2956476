//! Client for an OpenAI-compatible chat-completions endpoint, such as a
//! local or hosted Ollama server.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::GenerationConfig;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    allowed_models: Vec<String>,
    system_prompt: String,
}

impl GenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ModelUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            allowed_models: config.allowed_models.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a reply to `prompt` with the configured model.
    pub async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        self.generate_with_model(&self.model, prompt, temperature)
            .await
    }

    pub async fn generate_with_model(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        self.check_model(model)?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::ModelUnavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("response has no message content".to_string())
            })?;

        debug!(model, chars = content.len(), "generated reply");
        Ok(content.trim().to_string())
    }

    fn check_model(&self, model: &str) -> Result<(), GenerationError> {
        if self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model) {
            Ok(())
        } else {
            Err(GenerationError::ModelNotAllowed {
                model: model.to_string(),
                allowed: self.allowed_models.join(", "),
            })
        }
    }
}

//! Ollama client for routing and narration
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{LanguageModel, NarrationRequest, ROUTER_SYSTEM_PROMPT};
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Reusable Ollama client (connection-pooled)
pub struct OllamaClient {
    client: Client,
    base_url: String,
    router_model: String,
    chat_model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        router_model: String,
        chat_model: String,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            router_model,
            chat_model,
        })
    }

    async fn chat(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
        options: ModelOptions,
        format: Option<&'static str>,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_input.to_string(),
                },
            ],
            stream: false,
            format,
            options,
        };

        info!(model = %model, "Calling Ollama");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama request failed: {}", e);
                AgentError::Llm(format!("Ollama request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama error response ({}): {}", status, error_text);
            return Err(AgentError::Llm(format!(
                "Ollama returned {}: {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Ollama response: {}", e);
            AgentError::Llm(format!("Ollama parse error: {}", e))
        })?;

        let content = body.message.content.trim().to_string();
        if content.is_empty() {
            return Err(AgentError::Llm("Empty response from Ollama".to_string()));
        }

        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn classify(&self, input: &str) -> Result<String> {
        self.chat(
            &self.router_model,
            ROUTER_SYSTEM_PROMPT,
            input,
            ModelOptions::router(),
            Some("json"),
        )
        .await
    }

    async fn narrate(&self, request: &NarrationRequest) -> Result<String> {
        self.chat(
            &self.chat_model,
            &request.system_prompt,
            &request.user_input,
            ModelOptions::chat(),
            None,
        )
        .await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ModelOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ModelOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
    num_ctx: i32,
}

impl ModelOptions {
    /// Deterministic and short: only a one-key JSON object is expected.
    fn router() -> Self {
        Self {
            temperature: 0.0,
            num_predict: Some(50),
            num_ctx: 512,
        }
    }

    fn chat() -> Self {
        Self {
            temperature: 0.3,
            num_predict: None,
            num_ctx: 512,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

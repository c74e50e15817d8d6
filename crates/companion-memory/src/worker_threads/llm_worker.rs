//! Text generation collaborator
//!
//! Proxies prompts to an OpenAI-compatible chat completions endpoint. Every
//! call is fallible; callers bound it with [`generate_with_deadline`] and
//! degrade instead of blocking.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

pub struct LLMWorker {
    backend_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl LLMWorker {
    pub fn new(backend_url: String, model: String, api_key: Option<String>) -> Self {
        info!("LLM worker initialized with backend: {} (model {})", backend_url, model);
        Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.backend_url)
    }
}

#[async_trait]
impl TextGenerator for LLMWorker {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        debug!("LLM worker generating completion ({} prompt chars)", prompt.len());
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: 1000,
            temperature: 0.7,
            stream: false,
        };

        let mut builder = self.http_client.post(self.completions_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM backend request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM backend returned {}: {}", status, body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse LLM response: {}", e))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| anyhow::anyhow!("LLM response contained no choices"))
    }
}

/// Stand-in used when no backend is configured. Always fails.
pub struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("generation backend not configured"))
    }
}

/// Runs one generation with a deadline; an elapsed deadline is an error.
pub async fn generate_with_deadline(
    generator: &dyn TextGenerator,
    prompt: &str,
    deadline: Duration,
) -> anyhow::Result<String> {
    match tokio::time::timeout(deadline, generator.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("generation timed out after {:?}", deadline)),
    }
}

pub fn generator_from_config(config: &Config) -> Arc<dyn TextGenerator> {
    match &config.generation_url {
        Some(url) => Arc::new(LLMWorker::new(
            url.clone(),
            config.generation_model.clone(),
            config.generation_api_key.clone(),
        )),
        None => {
            warn!("GENERATION_URL not set; replies, fact extraction and summaries will degrade");
            Arc::new(UnavailableGenerator)
        }
    }
}

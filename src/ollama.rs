use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{ Deserialize, Serialize };
use tracing::{ debug, warn };

use crate::error::ContextError;
use crate::models::Mode;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What came back from the model endpoint. A failure carries a message that
/// is shown to the user in place of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    Generated(String),
    EndpointFailure(String),
}

impl ModelReply {
    pub fn text(&self) -> &str {
        match self {
            ModelReply::Generated(text) | ModelReply::EndpointFailure(text) => text,
        }
    }
}

#[async_trait(?Send)]
pub trait ModelClient {
    async fn generate(&self, prompt: &str, mode: Mode) -> ModelReply;
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl SamplingOptions {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Completion => Self {
                temperature: 0.1,
                top_p: 0.9,
                max_tokens: 1000,
            },
            Mode::Generation => Self {
                temperature: 0.3,
                top_p: 0.9,
                max_tokens: 2000,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming client for Ollama's `/api/generate`.
///
/// A client that could not be built is kept as its error; every request then
/// reports it as an endpoint failure.
pub struct OllamaClient {
    client: Result<Client, String>,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                warn!("HTTP client setup failed: {}", e);
                e.to_string()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    async fn send(&self, prompt: &str, mode: Mode) -> Result<String, ContextError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: SamplingOptions::for_mode(mode),
        };
        debug!("POST {} (model {}, {} prompt chars)", url, self.model, prompt.len());

        let client = self.client
            .as_ref()
            .map_err(|e| ContextError::Config(format!("HTTP client unavailable: {}", e)))?;
        let response: GenerateResponse = client
            .post(&url)
            .json(&body)
            .send().await?
            .error_for_status()?
            .json().await?;
        Ok(response.response)
    }
}

#[async_trait(?Send)]
impl ModelClient for OllamaClient {
    async fn generate(&self, prompt: &str, mode: Mode) -> ModelReply {
        match self.send(prompt, mode).await {
            Ok(text) => ModelReply::Generated(text),
            Err(e) => {
                warn!("Model request failed: {}", e);
                ModelReply::EndpointFailure(format!("Error communicating with Ollama: {}", e))
            }
        }
    }
}

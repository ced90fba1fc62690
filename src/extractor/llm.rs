//! Minimal client for the LLM APIs used for price extraction.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::config::{LlmConfig, LlmProvider};
use crate::utils::error::{AppError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_INSTRUCTION: &str =
    "You extract product information from e-commerce pages and answer with a single JSON object.";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Validation("LLM API key is not configured".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| match config.provider {
                LlmProvider::Gemini => GEMINI_BASE_URL.to_string(),
                LlmProvider::Openai => OPENAI_BASE_URL.to_string(),
            })
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            config,
            api_key,
            base_url,
        })
    }

    /// Send one prompt and return the model's text answer. Network errors,
    /// rate limits and server errors are retried with exponential backoff.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_delay_ms / 2)
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.retry_attempts);

        RetryIf::spawn(
            strategy,
            || self.complete_once(prompt),
            |e: &AppError| {
                let transient = e.is_transient();
                if transient {
                    tracing::warn!("LLM request failed, retrying: {}", e);
                }
                transient
            },
        )
        .await
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        match self.config.provider {
            LlmProvider::Gemini => self.complete_gemini(prompt).await,
            LlmProvider::Openai => self.complete_openai(prompt).await,
        }
    }

    async fn complete_gemini(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.config.model);
        let body = json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "responseMimeType": "application/json"
            }
        });

        tracing::debug!("Gemini generateContent: model={}", self.config.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let raw = Self::read_body(response).await?;

        let parsed: GeminiResponse = serde_json::from_str(&raw)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AppError::Extraction("Gemini returned no text".to_string()));
        }
        Ok(text)
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_INSTRUCTION },
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" }
        });

        tracing::debug!("OpenAI chat completion: model={}", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let raw = Self::read_body(response).await?;

        let parsed: OpenAiResponse = serde_json::from_str(&raw)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Extraction("OpenAI returned no content".to_string()))
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AppError::Llm {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

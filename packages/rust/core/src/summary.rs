//! Abstract generation through an OpenAI-compatible chat completions API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use wikidigest_shared::{Result, SummarizerConfig, WikiDigestError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Client for the summarization model.
///
/// Without an API key every call yields no summary and no request is sent.
#[derive(Debug, Clone)]
pub struct Summarizer {
    client: Client,
    config: SummarizerConfig,
    api_key: Option<String>,
}

impl Summarizer {
    pub fn new(config: &SummarizerConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WikiDigestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Build a summarizer reading the key from the configured env var.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "API key not set, summaries will not be generated"
            );
        }
        Self::new(config, api_key)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate an abstract for an article. Any failure yields `None`.
    #[instrument(skip_all, fields(title = %title))]
    pub async fn generate_summary(&self, title: &str, content: &str) -> Option<String> {
        if !self.has_api_key() {
            debug!("no API key, skipping summary");
            return None;
        }

        match self.try_generate(title, content).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "summary generation failed");
                None
            }
        }
    }

    /// Generate an abstract, reporting why it failed.
    pub async fn try_generate(&self, title: &str, content: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| WikiDigestError::Summarization("API key not configured".into()))?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: self.build_messages(title, content),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| WikiDigestError::Summarization(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(WikiDigestError::Summarization(format!(
                "API returned {status}: {snippet}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| WikiDigestError::Summarization(format!("malformed response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| WikiDigestError::Summarization("response has no choices".into()))?;

        if text.is_empty() {
            return Err(WikiDigestError::Summarization("empty summary".into()));
        }
        Ok(text)
    }

    fn build_messages(&self, title: &str, content: &str) -> Vec<ChatMessage> {
        let language = &self.config.language;
        let excerpt: String = content.chars().take(self.config.content_budget).collect();

        vec![
            ChatMessage {
                role: "system".into(),
                content: format!(
                    "You are an assistant that writes short summaries of Wikipedia articles in {language}."
                ),
            },
            ChatMessage {
                role: "user".into(),
                content: format!(
                    "Write a short summary of the following Wikipedia article in {language}. \
                     Keep it to 2-3 sentences and capture the main point of the article.\n\n\
                     Title: {title}\n\nContent: {excerpt}\n\nSummary:"
                ),
            },
        ]
    }
}

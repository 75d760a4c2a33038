//! Text-generation service client.
//!
//! The orchestrator sees generation as plain text in, plain text out through
//! the [`GenerationService`] trait: a prompt is dispatched with
//! [`GenerationService::send_request`] and the answer collected later with
//! [`GenerationService::get_response`]. [`HttpGenerator`] implements it
//! against an OpenAI-compatible chat-completions endpoint.

use std::future::Future;
use std::time::Duration;

use contentfill_shared::{ContentFillError, GenerationConfig, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("ContentFill/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// A remote text generator.
pub trait GenerationService: Send {
    /// Dispatch `prompt`. The answer is collected by the next
    /// [`get_response`](Self::get_response).
    fn send_request(&mut self, prompt: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the answer to the last dispatched prompt.
    fn get_response(&mut self) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
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
// HTTP implementation
// ---------------------------------------------------------------------------

/// Chat-completions client. One request is in flight at a time.
pub struct HttpGenerator {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    max_tokens: u32,
    pending: Option<JoinHandle<Result<String>>>,
}

impl HttpGenerator {
    /// Build a client from the `[generation]` config section.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ContentFillError::config(format!("invalid endpoint '{}': {e}", config.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ContentFillError::Generation(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            pending: None,
        })
    }

    /// The endpoint requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl GenerationService for HttpGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn send_request(&mut self, prompt: &str) -> Result<()> {
        if let Some(stale) = self.pending.take() {
            warn!("discarding unanswered generation request");
            stale.abort();
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        self.pending = Some(tokio::spawn(complete(client, endpoint, request)));
        debug!("generation request dispatched");
        Ok(())
    }

    async fn get_response(&mut self) -> Result<String> {
        let handle = self.pending.take().ok_or_else(|| {
            ContentFillError::Generation("no generation request is pending".into())
        })?;

        handle
            .await
            .map_err(|e| ContentFillError::Generation(format!("generation task failed: {e}")))?
    }
}

/// POST one chat request and return the first choice's text.
async fn complete(client: Client, endpoint: Url, request: ChatRequest) -> Result<String> {
    let response = client
        .post(endpoint.clone())
        .json(&request)
        .send()
        .await
        .map_err(|e| ContentFillError::Generation(format!("{endpoint}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(200).collect();
        return Err(ContentFillError::Generation(format!(
            "{endpoint}: HTTP {status}: {excerpt}"
        )));
    }

    let parsed: ChatResponse = response.json().await.map_err(|e| {
        ContentFillError::Generation(format!("{endpoint}: invalid response body: {e}"))
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ContentFillError::Generation(format!("{endpoint}: no choices returned")))
}

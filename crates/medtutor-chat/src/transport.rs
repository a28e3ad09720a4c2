//! Outbound transport to the model provider.
//!
//! [`ChatTransport`] is the seam the rest of the pipeline talks to: send a
//! request and get either the complete response text or the raw byte
//! stream. [`HttpTransport`] implements it over `reqwest` for a dedicated
//! prediction endpoint that accepts chat-completions payloads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use medtutor_core::config::ProviderConfig;
use medtutor_core::types::ChatRequest;

use crate::error::ChatError;
use crate::extract::{extract_completion_text, normalize_prediction_body};

const PREDICT_SUFFIX: &str = ":predict";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Incrementally available response bytes.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `request` and wait for the complete response text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError>;

    /// Send `request` and return the response body as a byte stream.
    async fn stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;
}

/// Append `:predict` to an endpoint URL unless it is already there.
pub fn predict_url(endpoint_url: &str) -> String {
    let clean = endpoint_url.trim().trim_end_matches('/');
    if clean.ends_with(PREDICT_SUFFIX) {
        clean.to_string()
    } else {
        format!("{}{}", clean, PREDICT_SUFFIX)
    }
}

/// Wrap a chat request in the prediction-endpoint instance envelope.
pub fn envelope(request: &ChatRequest) -> Value {
    json!({
        "instances": [{
            "@requestFormat": "chatCompletions",
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": request.stream,
        }]
    })
}

/// HTTP transport to a dedicated prediction endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint_url: &str, api_key: Option<String>) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, endpoint_url, api_key))
    }

    /// Reuse an existing connection pool.
    pub fn with_client(client: Client, endpoint_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            url: predict_url(endpoint_url),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(120),
        }
    }

    /// Build from provider settings. Fails when no endpoint is configured.
    pub fn from_config(client: Client, provider: &ProviderConfig) -> Result<Self, ChatError> {
        let endpoint = provider
            .endpoint_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ChatError::Transport("endpoint URL is not configured".to_string()))?;
        Ok(Self::with_client(client, endpoint, provider.api_key.clone())
            .with_timeout(Duration::from_secs(provider.timeout_secs)))
    }

    /// Whole-request timeout for non-streaming calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the enveloped request and check the status.
    ///
    /// Non-2xx responses become [`ChatError::Upstream`] carrying the status
    /// and body text.
    pub async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        info!(url = %self.url, stream = request.stream, "Calling model endpoint");
        let mut builder = self.client.post(&self.url).json(&envelope(request));
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        if !request.stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Model endpoint returned an error");
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Complete body, unwrapped from any `predictions` envelope into the
    /// chat-completions shape.
    pub async fn complete_body(&self, request: &ChatRequest) -> Result<Value, ChatError> {
        let mut request = request.clone();
        request.stream = false;
        let body: Value = self
            .send(&request)
            .await?
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
        Ok(normalize_prediction_body(body))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let body = self.complete_body(request).await?;
        let text = extract_completion_text(&body)?;
        debug!(chars = text.len(), "Completion received");
        Ok(text)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let mut request = request.clone();
        request.stream = true;
        let response = self.send(&request).await?;
        Ok(response
            .bytes_stream()
            .map_ok(|bytes| bytes.to_vec())
            .map_err(ChatError::from)
            .boxed())
    }
}

/// Stand-in used while no endpoint is configured. Every call fails with a
/// transport error, which the orchestrator turns into an error turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredTransport;

impl UnconfiguredTransport {
    fn error() -> ChatError {
        ChatError::Transport("endpoint URL is not configured".to_string())
    }
}

#[async_trait]
impl ChatTransport for UnconfiguredTransport {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, ChatError> {
        Err(Self::error())
    }

    async fn stream(&self, _request: &ChatRequest) -> Result<ByteStream, ChatError> {
        Err(Self::error())
    }
}

/// Transport for the configured provider, or [`UnconfiguredTransport`]
/// when no endpoint is set.
pub fn transport_from_config(client: Client, provider: &ProviderConfig) -> Arc<dyn ChatTransport> {
    match HttpTransport::from_config(client, provider) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            warn!(error = %e, "Model provider is not configured");
            Arc::new(UnconfiguredTransport)
        }
    }
}

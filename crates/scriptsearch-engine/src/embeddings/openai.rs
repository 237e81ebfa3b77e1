//! OpenAI-compatible embedding provider
//!
//! Provides query embeddings via OpenAI-compatible APIs including:
//! - OpenAI API
//! - Azure OpenAI
//! - Ollama
//!
//! # Endpoint Format
//!
//! - POST `{base_url}/v1/embeddings`
//! - Request: `{"model": "...", "input": ["text"]}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}], ...}`
//!
//! # Example
//!
//! ```ignore
//! use scriptsearch_engine::embeddings::{EmbeddingProvider, OpenAIConfig, OpenAIProvider};
//!
//! let provider = OpenAIProvider::new(OpenAIConfig::ollama())?;
//! let vector = provider.embed("an argument in the kitchen", "nomic-embed-text").await?;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "rate-limit")]
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
#[cfg(feature = "rate-limit")]
use std::num::NonZeroU32;
#[cfg(feature = "rate-limit")]
use std::sync::Arc;

use super::provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};
use crate::error::{Result, SearchError};

/// Default timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default max retries
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Default requests per second limit
#[cfg(feature = "rate-limit")]
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

#[cfg(feature = "rate-limit")]
type OpenAIRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Configuration for OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1" or "http://localhost:11434/v1")
    pub base_url: String,
    /// API key (optional for local providers like Ollama)
    pub api_key: Option<String>,
    /// Model used when the caller passes an empty model id, and for health checks
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Use Azure OpenAI header format (api-key instead of Bearer)
    pub azure_mode: bool,
    /// Requests per second limit (when rate-limit feature enabled)
    #[cfg(feature = "rate-limit")]
    pub requests_per_second: u32,
}

impl OpenAIConfig {
    /// Create config for an arbitrary endpoint and model
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            azure_mode: false,
            #[cfg(feature = "rate-limit")]
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    /// Create config for Ollama local endpoint
    pub fn ollama() -> Self {
        Self::new("http://localhost:11434/v1", "nomic-embed-text")
    }

    /// Create config for OpenAI API
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("https://api.openai.com/v1", DEFAULT_MODEL).with_api_key(api_key)
    }

    /// Create config from environment variables
    ///
    /// Expected environment variables:
    /// - `SCRIPTSEARCH_OPENAI_BASE_URL` - API base URL (default: https://api.openai.com/v1)
    /// - `SCRIPTSEARCH_OPENAI_API_KEY` - API key (optional)
    /// - `SCRIPTSEARCH_OPENAI_MODEL` - Model name (default: text-embedding-3-small)
    /// - `SCRIPTSEARCH_OPENAI_AZURE_MODE` - Use Azure header format (default: false)
    pub fn from_env() -> Self {
        let base_url = std::env::var("SCRIPTSEARCH_OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model =
            std::env::var("SCRIPTSEARCH_OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let azure_mode = std::env::var("SCRIPTSEARCH_OPENAI_AZURE_MODE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let mut config = Self::new(base_url, model).with_azure_mode(azure_mode);
        config.api_key = std::env::var("SCRIPTSEARCH_OPENAI_API_KEY").ok();
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_azure_mode(mut self, azure_mode: bool) -> Self {
        self.azure_mode = azure_mode;
        self
    }

    /// Set requests per second limit (when rate-limit feature enabled)
    #[cfg(feature = "rate-limit")]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }
}

/// Request body for OpenAI /v1/embeddings endpoint
#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

/// Single embedding in OpenAI response
#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Response from OpenAI /v1/embeddings endpoint
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// OpenAI-compatible embedding provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
    /// Embedding dimension detected from the first response (0 = unknown)
    dimension: AtomicUsize,
    #[cfg(feature = "rate-limit")]
    rate_limiter: Arc<OpenAIRateLimiter>,
}

impl OpenAIProvider {
    /// Create a new OpenAI-compatible provider
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;

        #[cfg(feature = "rate-limit")]
        let rate_limiter = {
            let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
            Arc::new(RateLimiter::direct(Quota::per_second(rps)))
        };

        Ok(Self {
            client,
            config,
            dimension: AtomicUsize::new(0),
            #[cfg(feature = "rate-limit")]
            rate_limiter,
        })
    }

    /// Create provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    /// Dimension detected from responses so far
    pub fn dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::Relaxed) {
            0 => None,
            dim => Some(dim),
        }
    }

    #[cfg(feature = "rate-limit")]
    async fn wait_for_permit(&self) {
        self.rate_limiter.until_ready().await;
    }

    #[cfg(not(feature = "rate-limit"))]
    async fn wait_for_permit(&self) {}

    /// Get the embeddings endpoint URL
    fn embeddings_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/embeddings", base)
        } else {
            format!("{}/v1/embeddings", base)
        }
    }

    fn post(&self, model: &str, text: &str) -> RequestBuilder {
        let body = EmbeddingsRequest {
            model: model.to_string(),
            input: vec![text.to_string()],
        };
        let request = self
            .client
            .post(self.embeddings_url())
            .header("Content-Type", "application/json")
            .json(&body);

        match self.config.api_key {
            Some(ref api_key) if self.config.azure_mode => request.header("api-key", api_key),
            Some(ref api_key) => request.header("Authorization", format!("Bearer {}", api_key)),
            None => request,
        }
    }

    /// Send request with retry logic
    async fn request_with_retry(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let mut retry_delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 0;

        loop {
            self.wait_for_permit().await;

            match self.send_request(model, text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    // Auth and model errors will not fix themselves
                    if matches!(
                        e,
                        SearchError::OpenAIAuth(_) | SearchError::OpenAIInvalidModel(_)
                    ) || attempt >= self.config.max_retries
                    {
                        return Err(e);
                    }
                    debug!(attempt, error = %e, "Embedding request failed, retrying");
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    /// Send a single request to the endpoint
    async fn send_request(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let response = self.post(model, text).send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::ProviderUnavailable("Request timed out".into())
            } else if e.is_connect() {
                SearchError::ProviderUnavailable(format!("Connection failed: {}", e))
            } else {
                SearchError::ProviderUnavailable(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let embed_response: EmbeddingsResponse = response.json().await.map_err(|e| {
                    SearchError::ProviderUnavailable(format!("Invalid response: {}", e))
                })?;

                let embedding = embed_response
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or_else(|| SearchError::Embedding("response contained no embeddings".into()))?;

                let dim = embedding.len();
                let cached = self.dimension.load(Ordering::Relaxed);
                if cached == 0 {
                    self.dimension.store(dim, Ordering::Relaxed);
                } else if cached != dim {
                    return Err(SearchError::DimensionMismatch {
                        expected: cached,
                        actual: dim,
                    });
                }

                Ok(embedding)
            }
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::OpenAIAuth(format!(
                    "Authentication failed: {}",
                    body
                )))
            }
            StatusCode::NOT_FOUND => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::OpenAIInvalidModel(format!(
                    "Model not found: {}",
                    body
                )))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());

                Err(SearchError::OpenAIRateLimit { retry_after })
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => Err(
                SearchError::ProviderUnavailable("Service temporarily unavailable".into()),
            ),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderUnavailable(format!(
                    "Request failed with status {}: {}",
                    status, body
                )))
            }
        }
    }

    /// Perform a health check
    async fn health_check(&self) -> Result<Duration> {
        let start = Instant::now();

        let response = self
            .post(&self.config.model, "health check")
            .send()
            .await
            .map_err(|e| SearchError::ProviderUnavailable(format!("Health check failed: {}", e)))?;

        let status = response.status();
        let latency = start.elapsed();

        match status {
            StatusCode::OK => Ok(latency),
            StatusCode::UNAUTHORIZED => Err(SearchError::OpenAIAuth("Invalid API key".into())),
            StatusCode::NOT_FOUND => Err(SearchError::OpenAIInvalidModel(format!(
                "Model '{}' not found",
                self.config.model
            ))),
            // Rate limited still means reachable
            StatusCode::TOO_MANY_REQUESTS => Ok(latency),
            _ => Err(SearchError::ProviderUnavailable(format!(
                "Health check failed with status {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::Embedding("cannot embed empty text".into()));
        }
        let model = if model_id.is_empty() {
            self.config.model.as_str()
        } else {
            model_id
        };
        self.request_with_retry(model, text).await
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        match self.health_check().await {
            Ok(latency) => Ok(ProviderStatus::healthy(
                EmbeddingProviderType::Openai,
                self.config.base_url.clone(),
            )
            .with_latency(latency.as_millis() as u64)),
            Err(e) => Ok(ProviderStatus::unavailable(
                EmbeddingProviderType::Openai,
                e.to_string(),
            )),
        }
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Openai
    }
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("timeout_secs", &self.config.timeout_secs)
            .field("azure_mode", &self.config.azure_mode)
            .finish()
    }
}

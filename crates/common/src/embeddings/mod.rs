//! Embedding service abstraction
//!
//! Turns a query into a fixed-length vector via the provider's embeddings
//! endpoint. One request per call, no retry.

use crate::config::{require_present, AppConfig};
use crate::errors::{AppError, Result, DEFAULT_UPSTREAM_STATUS};
use crate::metrics;
use crate::usage::Usage;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A query embedding plus the tokens it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub embedding: Vec<f32>,
    pub usage: Usage,
}

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate the embedding for a single text with the given model
    async fn embed(&self, model: &str, input: &str) -> Result<Embedding>;

    /// Fail early when credentials are missing, before any other provider is touched
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    input: &'a str,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.openai.api_key.clone(),
            config.openai.base_url.clone(),
            config.openai_timeout(),
        )
    }

    async fn make_request(&self, model: &str, input: &str) -> Result<Embedding> {
        self.ensure_configured()?;
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&OpenAIRequest { model, input })
            .send()
            .await
            .map_err(|e| AppError::external(
                format!("OpenAI embeddings request failed: {}", e),
                None,
                None,
            ))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(
                format!("OpenAI embeddings failed ({})", status.as_u16()),
                Some(status.as_u16()),
                Some(json!({ "body": body })),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            AppError::external(
                "OpenAI embeddings returned invalid JSON.",
                Some(DEFAULT_UPSTREAM_STATUS),
                Some(json!({ "error": e.to_string() })),
            )
        })?;

        parse_embedding_payload(payload)
    }
}

/// Pull the first vector out of an embeddings payload
pub fn parse_embedding_payload(payload: Value) -> Result<Embedding> {
    let first = payload["data"].as_array().and_then(|data| data.first());
    let Some(first) = first else {
        return Err(AppError::external(
            "OpenAI embeddings response had no data.",
            Some(DEFAULT_UPSTREAM_STATUS),
            Some(json!({ "payload": payload })),
        ));
    };

    let embedding: Vec<f32> = first["embedding"]
        .as_array()
        .map(|values| values.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
        .unwrap_or_default();

    Ok(Embedding {
        embedding,
        usage: Usage::from_embeddings(&payload),
    })
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, model: &str, input: &str) -> Result<Embedding> {
        let start = Instant::now();
        let result = self.make_request(model, input).await;

        metrics::record_embedding(start.elapsed().as_secs_f64(), model, result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(model = model, error = %e, "Embedding request failed");
        }
        result
    }

    fn ensure_configured(&self) -> Result<()> {
        require_present(&[("OPENAI_API_KEY", self.api_key.as_deref())])
    }
}

/// Mock embedder for testing
///
/// Produces a deterministic vector derived from the input and counts calls.
pub struct MockEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _model: &str, input: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seed = input.len() as f32;
        let tokens = input.split_whitespace().count() as u64;
        Ok(Embedding {
            embedding: (0..self.dimension).map(|i| (seed + i as f32).sin()).collect(),
            usage: Usage::new(tokens, 0, 0, tokens),
        })
    }
}

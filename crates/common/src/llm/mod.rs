//! Text generation client (OpenAI Responses API)
//!
//! Provides:
//! - The [`LanguageModel`] trait the services call
//! - [`OpenAIResponses`], one POST per call
//! - The single temperature-rejection fallback used by chat
//! - [`ScriptedModel`] for tests

use crate::config::{require_present, AppConfig};
use crate::errors::{AppError, Result, DEFAULT_UPSTREAM_STATUS};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One message of model input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputMessage {
    pub role: String,
    pub content: String,
}

impl InputMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Request body of the Responses endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ResponsesRequest {
    /// A system instruction followed by one user message
    pub fn prompt(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: vec![InputMessage::system(system), InputMessage::user(user)],
            temperature: None,
        }
    }
}

/// Trait for text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one request and return the raw provider payload
    async fn respond(&self, request: &ResponsesRequest) -> Result<Value>;

    /// Fail early when credentials are missing
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }
}

/// OpenAI Responses client
pub struct OpenAIResponses {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAIResponses {
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

    async fn make_request(&self, request: &ResponsesRequest) -> Result<Value> {
        self.ensure_configured()?;
        let url = format!("{}/responses", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::external(format!("OpenAI responses request failed: {}", e), None, None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(
                format!("OpenAI responses failed ({})", status.as_u16()),
                Some(status.as_u16()),
                Some(json!({ "body": body })),
            ));
        }

        response.json().await.map_err(|e| {
            AppError::external(
                "OpenAI responses returned invalid JSON.",
                Some(DEFAULT_UPSTREAM_STATUS),
                Some(json!({ "error": e.to_string() })),
            )
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIResponses {
    async fn respond(&self, request: &ResponsesRequest) -> Result<Value> {
        let start = Instant::now();
        let result = self.make_request(request).await;

        metrics::record_llm_call(start.elapsed().as_secs_f64(), &request.model, result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(model = %request.model, error = %e, "Responses request failed");
        }
        result
    }

    fn ensure_configured(&self) -> Result<()> {
        require_present(&[("OPENAI_API_KEY", self.api_key.as_deref())])
    }
}

/// True when the provider rejected `param` as unsupported for this model
pub fn is_unsupported_param_error(err: &AppError, param: &str) -> bool {
    match err {
        AppError::ExternalApi { status: Some(400), details: Some(details), .. } => details["body"]
            .as_str()
            .map(|body| body.contains(&format!("Unsupported parameter: '{}'", param)))
            .unwrap_or(false),
        _ => false,
    }
}

/// Call the model; if temperature is rejected as unsupported, retry exactly once without it
pub async fn respond_with_temperature_fallback(
    model: &dyn LanguageModel,
    request: ResponsesRequest,
) -> Result<Value> {
    match model.respond(&request).await {
        Err(err) if request.temperature.is_some() && is_unsupported_param_error(&err, "temperature") => {
            tracing::info!(model = %request.model, "Model rejected temperature, retrying without it");
            let fallback = ResponsesRequest { temperature: None, ..request };
            model.respond(&fallback).await
        }
        other => other,
    }
}

/// Build a minimal Responses payload carrying `text`
pub fn text_payload(text: &str, input_tokens: u64, output_tokens: u64) -> Value {
    json!({
        "output": [{
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": text }]
        }],
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
            "total_tokens": input_tokens + output_tokens
        }
    })
}

/// Test double that replays queued results and records every request
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<ResponsesRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Value>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: one text reply per entry
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(text_payload(t, 10, 5))).collect())
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ResponsesRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(&self, request: &ResponsesRequest) -> Result<Value> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        next.unwrap_or_else(|| Err(AppError::Internal {
            message: "ScriptedModel has no reply queued".to_string(),
        }))
    }
}

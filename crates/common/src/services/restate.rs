//! Question restatement for retrieval

use super::ServiceContext;
use crate::config::AppConfig;
use crate::errors::{AppError, Result, DEFAULT_UPSTREAM_STATUS};
use crate::llm::ResponsesRequest;
use crate::request::RequestData;
use crate::usage::{extract_response_text, Usage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

const RESTATE_INSTRUCTION: &str = "You rewrite a question or topic into a concise, reverent, 19th-century sermon style. \
Preserve intent, avoid new claims, and keep the question or topic optimized for retrieval on a vector db index of Spurgeon sermons. \
If the request is a question, return a question. If the request is a topic, return a topic.";

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct RestateRequest {
    #[validate(length(min = 1, message = "Question or topic is required."))]
    pub question: String,
    pub model: String,
}

impl RestateRequest {
    pub fn new(question: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            question: question.into(),
            model: config.models.responses.clone(),
        }
    }

    /// Read `question`/`topic`/`query` and `model`
    pub fn from_request(data: &RequestData, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            question: data.string(&["question", "topic", "query"]),
            model: data.string_or("model", &config.models.responses),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestateResponse {
    pub original: String,
    pub restated: String,
    pub model: String,
    pub usage: Usage,
}

pub async fn restate(ctx: &ServiceContext, mut request: RestateRequest) -> Result<RestateResponse> {
    request.question = request.question.trim().to_string();
    request.validate()?;
    ctx.model.ensure_configured()?;

    let user = json!({ "question": request.question }).to_string();
    let payload = ctx
        .model
        .respond(&ResponsesRequest::prompt(&request.model, RESTATE_INSTRUCTION, user))
        .await?;

    let restated = extract_response_text(&payload);
    if restated.is_empty() {
        return Err(AppError::external(
            "No text returned from model.",
            Some(DEFAULT_UPSTREAM_STATUS),
            Some(json!({ "model": request.model })),
        ));
    }

    tracing::debug!(original = %request.question, restated = %restated, "Question restated");

    Ok(RestateResponse {
        original: request.question,
        restated,
        usage: Usage::from_responses(&payload),
        model: request.model,
    })
}

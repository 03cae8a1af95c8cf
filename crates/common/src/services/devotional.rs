//! Devotional generation from sermon excerpts

use super::ServiceContext;
use crate::config::AppConfig;
use crate::errors::{AppError, Result, DEFAULT_UPSTREAM_STATUS};
use crate::llm::ResponsesRequest;
use crate::request::RequestData;
use crate::usage::{extract_response_text, Usage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

const EXCERPTS_REQUIRED: &str = "Excerpts are required.";

/// Characters of model output echoed back when it cannot be parsed
const SAMPLE_CHARS: usize = 500;

const DEVOTIONAL_INSTRUCTION: &str = "You write a 500-word devotional using only the provided excerpts. \
Return JSON only with fields: title, intro, paragraphs (array), references (array of {title,url}). \
Do not include markdown or extra keys. \
Rewrite the material into a cohesive article that presents the ideas directly, without mentioning or referring to the author \
(e.g., 'the author says,' 'he argues,' 'Spurgeon treats...'). The result should read as if the ideas are being stated directly \
(e.g., 'John 3:16 teaches...,' 'This promise shows...'), not as quotations or commentary on another writer.";

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct DevotionalRequest {
    #[validate(length(min = 1, message = "Question or topic is required."))]
    pub question: String,

    /// Usually `{title, url, excerpt}` objects; passed to the model as-is
    #[validate(length(min = 1, message = "Excerpts are required."))]
    pub excerpts: Vec<Value>,

    pub model: String,
}

impl DevotionalRequest {
    pub fn new(question: impl Into<String>, excerpts: Vec<Value>, config: &AppConfig) -> Self {
        Self {
            question: question.into(),
            excerpts,
            model: config.models.responses.clone(),
        }
    }

    /// Read `question`/`topic`/`query`, `excerpts` and `model`; non-array excerpts are rejected
    pub fn from_request(data: &RequestData, config: &AppConfig) -> Result<Self> {
        let question = data.string(&["question", "topic", "query"]);
        let excerpts = match data.get("excerpts") {
            Some(Value::Array(items)) => items,
            _ if question.is_empty() => Vec::new(),
            _ => return Err(AppError::validation(EXCERPTS_REQUIRED)),
        };

        Ok(Self {
            question,
            excerpts,
            model: data.string_or("model", &config.models.responses),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Devotional {
    pub title: String,
    #[serde(default)]
    pub intro: String,
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevotionalResponse {
    pub devotional: Devotional,
    pub model: String,
    pub usage: Usage,
}

pub async fn generate_devotional(ctx: &ServiceContext, mut request: DevotionalRequest) -> Result<DevotionalResponse> {
    request.question = request.question.trim().to_string();
    // A blank question is reported ahead of missing excerpts
    if request.question.is_empty() {
        return Err(AppError::validation("Question or topic is required."));
    }
    request.validate()?;
    ctx.model.ensure_configured()?;

    let user = json!({ "question": request.question, "excerpts": request.excerpts }).to_string();
    let payload = ctx
        .model
        .respond(&ResponsesRequest::prompt(&request.model, DEVOTIONAL_INSTRUCTION, user))
        .await?;

    let text = extract_response_text(&payload);
    if text.is_empty() {
        return Err(AppError::external(
            "No text returned from model.",
            Some(DEFAULT_UPSTREAM_STATUS),
            Some(json!({ "model": request.model })),
        ));
    }

    let devotional = parse_devotional(&text)?;
    tracing::info!(
        model = %request.model,
        excerpts = request.excerpts.len(),
        paragraphs = devotional.paragraphs.len(),
        "Devotional generated"
    );

    Ok(DevotionalResponse {
        devotional,
        usage: Usage::from_responses(&payload),
        model: request.model,
    })
}

/// Parse the model's JSON text; any failure carries a truncated sample of the output
pub fn parse_devotional(text: &str) -> Result<Devotional> {
    let sample = || text.chars().take(SAMPLE_CHARS).collect::<String>();

    let value: Value = serde_json::from_str(text).map_err(|e| {
        AppError::external(
            "Model output was not valid JSON.",
            Some(DEFAULT_UPSTREAM_STATUS),
            Some(json!({ "error": e.to_string(), "sample": sample() })),
        )
    })?;

    serde_json::from_value(value).map_err(|e| {
        AppError::external(
            "Model output did not match the devotional format.",
            Some(DEFAULT_UPSTREAM_STATUS),
            Some(json!({ "error": e.to_string(), "sample": sample() })),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::llm::ScriptedModel;
    use crate::services::testing::{bodies_file, default_context};
    use std::sync::Arc;

    fn excerpts() -> Vec<Value> {
        vec![json!({
            "title": "Pray Without Ceasing",
            "url": "https://example.org/s-1",
            "excerpt": "Prayer is the breath of the soul."
        })]
    }

    fn devotional_json() -> String {
        json!({
            "title": "The Breath of the Soul",
            "intro": "Prayer is no occasional exercise.",
            "paragraphs": ["First paragraph.", "Second paragraph."],
            "references": [{ "title": "Pray Without Ceasing", "url": "https://example.org/s-1" }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_generates_devotional() {
        let bodies = bodies_file();
        let text = devotional_json();
        let model = Arc::new(ScriptedModel::with_texts(&[text.as_str()]));
        let ctx = default_context(&bodies, model.clone());

        let response = generate_devotional(
            &ctx,
            DevotionalRequest::new("How do I persevere in prayer?", excerpts(), &ctx.config),
        )
        .await
        .unwrap();

        assert_eq!(response.devotional.title, "The Breath of the Soul");
        assert_eq!(response.devotional.paragraphs.len(), 2);
        assert_eq!(response.devotional.references[0].url, "https://example.org/s-1");

        let user: Value = serde_json::from_str(&model.requests()[0].input[1].content).unwrap();
        assert_eq!(user["excerpts"], json!(excerpts()));
    }

    #[tokio::test]
    async fn test_invalid_json_is_external_error_with_sample() {
        let bodies = bodies_file();
        let long = format!("Here is your devotional: {}", "x".repeat(800));
        let model = Arc::new(ScriptedModel::with_texts(&[long.as_str()]));
        let ctx = default_context(&bodies, model);

        let err = generate_devotional(&ctx, DevotionalRequest::new("prayer", excerpts(), &ctx.config))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExternalApi);
        assert_eq!(err.to_string(), "Model output was not valid JSON.");
        let sample = err.details().unwrap()["sample"].as_str().unwrap();
        assert_eq!(sample.chars().count(), 500);
    }

    #[tokio::test]
    async fn test_validation_before_network() {
        let bodies = bodies_file();
        let model = Arc::new(ScriptedModel::default());
        let ctx = default_context(&bodies, model.clone());

        let err = generate_devotional(&ctx, DevotionalRequest::new("  ", excerpts(), &ctx.config))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Question or topic is required.");

        let err = generate_devotional(&ctx, DevotionalRequest::new("prayer", vec![], &ctx.config))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Excerpts are required.");

        assert!(model.requests().is_empty());
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let devotional = parse_devotional(r#"{"title": "T", "paragraphs": ["p"]}"#).unwrap();
        assert_eq!(devotional.intro, "");
        assert!(devotional.references.is_empty());

        let err = parse_devotional(r#"{"intro": "no title"}"#).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 502);
    }

    #[test]
    fn test_from_request_rejects_non_array_excerpts() {
        let config = AppConfig::default();
        let data = RequestData::from_value(json!({ "question": "q", "excerpts": "not a list" })).unwrap();
        let err = DevotionalRequest::from_request(&data, &config).unwrap_err();
        assert_eq!(err.to_string(), "Excerpts are required.");
    }
}

//! Semantic search over the sermon index
//!
//! embed question -> top-K vector query -> excerpt windows from the body file

use super::ServiceContext;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::excerpts::{excerpt_window, BodyMap};
use crate::request::{normalize_string, parse_integer, RequestData};
use crate::usage::Usage;
use crate::vector::{VectorMatch, VectorQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

const TOP_K_MESSAGE: &str = "topK must be a positive integer.";
const CONTEXT_CHARS_MESSAGE: &str = "contextChars must be a non-negative integer.";
/// Order in which invalid fields are reported
const FIELD_ORDER: &[&str] = &["question", "top_k", "context_chars"];

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, message = "Question is required."))]
    pub question: String,

    #[validate(range(min = 1, message = "topK must be a positive integer."))]
    pub top_k: i64,

    #[validate(range(min = 0, message = "contextChars must be a non-negative integer."))]
    pub context_chars: i64,

    pub region: String,
    pub bucket: String,
    pub index: String,
    /// Embedding model
    pub model: String,
}

impl SearchRequest {
    /// A request using the configured defaults for everything but question and topK
    pub fn new(question: impl Into<String>, top_k: i64, config: &AppConfig) -> Self {
        Self {
            question: question.into(),
            top_k,
            context_chars: config.search.context_chars as i64,
            region: config.vector.region.clone(),
            bucket: config.vector.bucket.clone(),
            index: config.vector.index.clone(),
            model: config.models.embedding.clone(),
        }
    }

    /// Read `question`/`query`/`topic`, `topK`, `contextChars` and index overrides
    pub fn from_request(data: &RequestData, config: &AppConfig) -> Result<Self> {
        let question = data.string(&["question", "query", "topic"]);
        let top_k = parse_integer(data.get("topK").as_ref(), config.search.top_k as i64, "topK", TOP_K_MESSAGE)?;
        let context_chars = parse_integer(
            data.get("contextChars").as_ref(),
            config.search.context_chars as i64,
            "contextChars",
            CONTEXT_CHARS_MESSAGE,
        )?;

        Ok(Self {
            question,
            top_k,
            context_chars,
            region: data.string_or("region", &config.vector.region),
            bucket: data.string_or("bucket", &config.vector.bucket),
            index: data.string_or("index", &config.vector.index),
            model: data.string_or("model", &config.models.embedding),
        })
    }
}

/// One hit with its excerpt window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub key: String,
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub sermon_id: String,
    pub offset_start: usize,
    pub offset_end: usize,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub usage: Usage,
}

/// Run one search
pub async fn search(ctx: &ServiceContext, mut request: SearchRequest) -> Result<SearchResponse> {
    request.question = request.question.trim().to_string();
    request
        .validate()
        .map_err(|e| AppError::from_validation(e, FIELD_ORDER))?;

    ctx.embedder.ensure_configured()?;
    ctx.index.ensure_configured()?;

    let embedded = ctx.embedder.embed(&request.model, &request.question).await?;

    let matches = ctx
        .index
        .query(&VectorQuery {
            region: request.region.clone(),
            bucket: request.bucket.clone(),
            index: request.index.clone(),
            top_k: request.top_k as usize,
            embedding: embedded.embedding,
        })
        .await?;

    let bodies = ctx.excerpts.get_map(&ctx.config.excerpts.bodies_path).await?;
    let context_chars = request.context_chars as usize;
    let results: Vec<SearchResult> = matches
        .into_iter()
        .map(|hit| to_result(hit, &bodies, context_chars))
        .collect();

    tracing::info!(
        top_k = request.top_k,
        results = results.len(),
        index = %request.index,
        "Search complete"
    );

    Ok(SearchResponse {
        query: request.question,
        results,
        usage: embedded.usage,
    })
}

fn to_result(hit: VectorMatch, bodies: &BodyMap, context_chars: usize) -> SearchResult {
    let meta = &hit.metadata;
    let sermon_id = normalize_string(&meta["sermon_id"]);
    let offset_start = offset(&meta["offset_start"]);
    // A reversed pair collapses to an empty match at offset_start
    let offset_end = offset(&meta["offset_end"]).max(offset_start);

    let excerpt = bodies
        .get(&sermon_id)
        .filter(|body| !body.is_empty())
        .map(|body| excerpt_window(body, offset_start, offset_end, context_chars))
        .unwrap_or_default();

    SearchResult {
        key: hit.key,
        distance: hit.distance,
        title: meta["title"].as_str().map(String::from),
        url: meta["url"].as_str().map(String::from),
        sermon_id,
        offset_start,
        offset_end,
        excerpt,
    }
}

/// Metadata offsets may arrive as numbers or strings; anything else is zero
fn offset(value: &Value) -> usize {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0) as usize,
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f > 0.0).map(|f| f as usize).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::llm::ScriptedModel;
    use crate::services::testing::{bodies_file, context, default_context, hit, BODY};
    use crate::vector::MockVectorIndex;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_search_builds_excerpts() {
        let bodies = bodies_file();
        let ctx = default_context(&bodies, Arc::new(ScriptedModel::default()));

        let mut request = SearchRequest::new("How do I persevere in prayer?", 3, &ctx.config);
        request.context_chars = 120;
        let response = search(&ctx, request).await.unwrap();

        assert_eq!(response.query, "How do I persevere in prayer?");
        assert_eq!(response.results.len(), 3);
        for result in &response.results {
            assert!(result.offset_start <= result.offset_end);
        }
        assert_eq!(response.results[0].excerpt, BODY);
        assert_eq!(response.results[0].title.as_deref(), Some("Sermon s-1"));
        assert_eq!(response.results[2].excerpt, "");
        assert!(response.usage.input_tokens > 0);
    }

    #[tokio::test]
    async fn test_context_window_is_applied() {
        let bodies = bodies_file();
        let ctx = default_context(&bodies, Arc::new(ScriptedModel::default()));

        let mut request = SearchRequest::new("prayer", 1, &ctx.config);
        request.context_chars = 2;
        let response = search(&ctx, request).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].excerpt, "Pray wi");
    }

    #[tokio::test]
    async fn test_blank_question_fails_before_network() {
        let bodies = bodies_file();
        let index = Arc::new(MockVectorIndex::new(vec![]));
        let ctx = context(&bodies, index.clone(), Arc::new(ScriptedModel::default()));

        for blank in ["", "   ", "\n\t"] {
            let err = search(&ctx, SearchRequest::new(blank, 5, &ctx.config)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(err.to_string(), "Question is required.");
        }
        assert!(index.queries().is_empty());
    }

    #[tokio::test]
    async fn test_question_reported_before_numeric_fields() {
        let bodies = bodies_file();
        let ctx = default_context(&bodies, Arc::new(ScriptedModel::default()));

        for _ in 0..100 {
            let mut request = SearchRequest::new("  ", 0, &ctx.config);
            request.context_chars = -1;
            let err = search(&ctx, request).await.unwrap_err();
            assert_eq!(err.to_string(), "Question is required.");
        }

        let mut request = SearchRequest::new("grace", 0, &ctx.config);
        request.context_chars = -1;
        let err = search(&ctx, request).await.unwrap_err();
        assert_eq!(err.to_string(), "topK must be a positive integer.");
    }

    #[tokio::test]
    async fn test_top_k_must_be_positive() {
        let bodies = bodies_file();
        let ctx = default_context(&bodies, Arc::new(ScriptedModel::default()));

        let err = search(&ctx, SearchRequest::new("grace", 0, &ctx.config)).await.unwrap_err();
        assert_eq!(err.to_string(), "topK must be a positive integer.");
    }

    #[tokio::test]
    async fn test_reversed_offsets_clamped() {
        let bodies = bodies_file();
        let index = Arc::new(MockVectorIndex::new(vec![hit("k", "s-1", 10, 4)]));
        let ctx = context(&bodies, index, Arc::new(ScriptedModel::default()));

        let mut request = SearchRequest::new("grace", 1, &ctx.config);
        request.context_chars = 0;
        let response = search(&ctx, request).await.unwrap();

        assert_eq!(response.results[0].offset_start, 10);
        assert_eq!(response.results[0].offset_end, 10);
        assert_eq!(response.results[0].excerpt, "");
    }

    #[tokio::test]
    async fn test_index_failure_propagates() {
        let bodies = bodies_file();
        let index = Arc::new(MockVectorIndex::failing("S3 Vectors query failed (403)", 403));
        let ctx = context(&bodies, index, Arc::new(ScriptedModel::default()));

        let err = search(&ctx, SearchRequest::new("grace", 2, &ctx.config)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalApi);
        assert_eq!(err.status_code().as_u16(), 403);
    }

    #[test]
    fn test_from_request_aliases_and_defaults() {
        let config = AppConfig::default();
        let mut data = RequestData::from_value(json!({ "topic": "sovereignty", "contextChars": "50" })).unwrap();
        data.query.insert("topK".to_string(), "7".to_string());
        data.query.insert("index".to_string(), "other-index".to_string());

        let request = SearchRequest::from_request(&data, &config).unwrap();
        assert_eq!(request.question, "sovereignty");
        assert_eq!(request.top_k, 7);
        assert_eq!(request.context_chars, 50);
        assert_eq!(request.index, "other-index");
        assert_eq!(request.bucket, "spurgeon");
        assert_eq!(request.model, "text-embedding-3-small");
    }

    #[test]
    fn test_from_request_rejects_bad_numbers() {
        let config = AppConfig::default();
        let data = RequestData::from_value(json!({ "question": "q", "topK": "lots" })).unwrap();
        assert_eq!(
            SearchRequest::from_request(&data, &config).unwrap_err().to_string(),
            "topK must be a number."
        );

        let data = RequestData::from_value(json!({ "question": "q", "contextChars": 1.5 })).unwrap();
        assert_eq!(
            SearchRequest::from_request(&data, &config).unwrap_err().to_string(),
            "contextChars must be a non-negative integer."
        );
    }

    #[test]
    fn test_offset_parsing() {
        assert_eq!(offset(&json!(12)), 12);
        assert_eq!(offset(&json!("34")), 34);
        assert_eq!(offset(&json!(-3)), 0);
        assert_eq!(offset(&json!(null)), 0);
    }
}

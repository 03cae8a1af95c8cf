//! Conversational router
//!
//! Each message is classified into one of four categories. The grounded
//! categories run a sermon search first and feed the excerpts back to the
//! model as context. Both candidate searches start alongside
//! classification; only the one matching the chosen category is awaited.

use super::search::{search, SearchRequest, SearchResponse};
use super::ServiceContext;
use crate::diagnostics::Probe;
use crate::errors::{AppError, Result, DEFAULT_UPSTREAM_STATUS};
use crate::llm::{respond_with_temperature_fallback, InputMessage, LanguageModel, ResponsesRequest};
use crate::metrics;
use crate::request::{normalize_string, RequestData};
use crate::usage::{extract_response_text, Usage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tokio::task::JoinHandle;
use validator::Validate;

pub const SEARCH_TOOL: &str = "spurgeon.search";

const PERSONA: &str = "You are Charles Spurgeon, speaking in a warm, pastoral 19th-century tone. \
Hold theological conversations with clarity, humility, and scriptural fidelity. \
When helpful, you can craft devotionals grounded in Scripture. \
If the question is theological, you must ground your reply in the provided search results. \
Ask clarifying questions if the user's request is unclear.";

const CLASSIFICATION_INSTRUCTION: &str = "Classify the user's message into exactly one category: \
\"theological\", \"casual\", \"create_devotional\", or \"inappropriate\". \
Theological means faith, doctrine, Scripture, prayer, devotion, church life, or moral counsel. \
Create_devotional means the user is explicitly asking for a devotional or meditation. \
Casual means greetings, small talk, or simple pleasantries. \
Inappropriate means abusive, sexual, hateful, illegal, or unrelated to a theological discussion. \
Reply with JSON only in the format {\"category\":\"theological|casual|create_devotional|inappropriate\",\"reason\":\"short\"}.";

const GROUNDING_PREFIX: &str = "Search results (JSON). Use these excerpts as your grounding context. \
Do not invent citations beyond what is provided.\n";

const THEOLOGICAL_INSTRUCTION: &str = "Keep the response under 200 words.";

const DEVOTIONAL_INSTRUCTION: &str = "The user asked for a devotional. Write a devotional in Spurgeon's voice \
using the provided search excerpts as the grounding material.";

pub const DEFLECTION_REPLY: &str = "Beloved, this matter lies beyond my appointed sphere of discourse. \
If you have a question of theology, Scripture, or devotion, I would gladly speak to it.";

/// Intent of an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Theological,
    Casual,
    CreateDevotional,
    Inappropriate,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Theological => "theological",
            Category::Casual => "casual",
            Category::CreateDevotional => "create_devotional",
            Category::Inappropriate => "inappropriate",
        }
    }

    /// Read the classifier's JSON reply; anything unrecognized is theological
    pub fn from_classifier_output(text: &str) -> Self {
        let category = serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| v["category"].as_str().map(str::to_lowercase));

        match category.as_deref() {
            Some("casual") => Category::Casual,
            Some("create_devotional") => Category::CreateDevotional,
            Some("inappropriate") => Category::Inappropriate,
            _ => Category::Theological,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prior turn supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Audit record of a tool invocation made for this turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRun {
    pub name: String,
    pub arguments: Value,
    pub output: Value,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "Message is required."))]
    pub message: String,
    pub history: Vec<ChatTurn>,
    pub model: String,
    /// Forwarded only when finite
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Message from `message`/`question`/`prompt`; history, model and temperature from the body only
    pub fn from_request(data: &RequestData, default_model: &str) -> Result<Self> {
        let history = match data.body_field("history") {
            Some(Value::Array(entries)) => entries.iter().map(turn_from_value).collect(),
            _ => Vec::new(),
        };

        let model = data
            .body_field("model")
            .map(normalize_string)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model.to_string());

        let temperature = match data.body_field("temperature") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        Ok(Self {
            message: data.string(&["message", "question", "prompt"]),
            history,
            model,
            temperature: temperature.filter(|t| t.is_finite()),
        })
    }
}

fn turn_from_value(value: &Value) -> ChatTurn {
    ChatTurn {
        role: value["role"].as_str().unwrap_or_default().to_string(),
        content: value["content"].as_str().unwrap_or_default().to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub model: String,
    /// Usage of the final generation call only
    pub usage: Usage,
    pub tool_runs: Vec<ToolRun>,
}

/// Result of one speculative search: tool output and error flag
type SearchOutcome = (Value, bool);

/// Aborts the task if dropped before it was consumed
struct SpeculativeSearch {
    top_k: usize,
    handle: JoinHandle<SearchOutcome>,
}

impl SpeculativeSearch {
    fn spawn(ctx: &ServiceContext, question: &str, top_k: usize) -> Self {
        let ctx = ctx.clone();
        let request = SearchRequest::new(question, top_k as i64, &ctx.config);
        let handle = tokio::spawn(async move { run_search(&ctx, request).await });
        Self { top_k, handle }
    }

    async fn outcome(mut self) -> SearchOutcome {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(e) => (json!({ "error": format!("Search task failed: {}", e) }), true),
        }
    }
}

impl Drop for SpeculativeSearch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_search(ctx: &ServiceContext, request: SearchRequest) -> SearchOutcome {
    match search(ctx, request).await {
        Ok(response) => (trim_search_output(&response), false),
        Err(e) => {
            tracing::warn!(error = %e, "Chat search failed");
            (json!({ "error": e.to_string() }), true)
        }
    }
}

/// Keep only what the model needs from each hit
fn trim_search_output(response: &SearchResponse) -> Value {
    let results: Vec<Value> = response
        .results
        .iter()
        .map(|r| {
            json!({
                "title": r.title.clone().unwrap_or_default(),
                "url": r.url.clone().unwrap_or_default(),
                "sermon_id": r.sermon_id,
                "excerpt": r.excerpt,
            })
        })
        .collect();
    json!({ "results": results })
}

async fn classify(model: &dyn LanguageModel, classifier: &str, message: &str) -> Result<Category> {
    let payload = model
        .respond(&ResponsesRequest::prompt(classifier, CLASSIFICATION_INSTRUCTION, message))
        .await?;
    Ok(Category::from_classifier_output(&extract_response_text(&payload)))
}

/// Persona, valid history turns, optional grounding and instruction, then the message
fn build_input(
    history: &[ChatTurn],
    message: &str,
    search_context: Option<&str>,
    instruction: Option<&str>,
) -> Vec<InputMessage> {
    let mut input = vec![InputMessage::system(PERSONA)];

    input.extend(
        history
            .iter()
            .filter(|turn| matches!(turn.role.as_str(), "user" | "assistant") && !turn.content.is_empty())
            .map(|turn| InputMessage {
                role: turn.role.clone(),
                content: turn.content.clone(),
            }),
    );

    if let Some(context) = search_context {
        input.push(InputMessage::system(format!("{}{}", GROUNDING_PREFIX, context)));
    }
    if let Some(instruction) = instruction {
        input.push(InputMessage::system(instruction));
    }
    input.push(InputMessage::user(message));
    input
}

pub async fn chat(ctx: &ServiceContext, mut request: ChatRequest) -> Result<ChatResponse> {
    let _probe = Probe::start("chat", &ctx.config.diagnostics);

    request.message = request.message.trim().to_string();
    request.validate()?;
    ctx.model.ensure_configured()?;

    let theological = SpeculativeSearch::spawn(ctx, &request.message, ctx.config.chat.top_k_theological);
    let devotional = SpeculativeSearch::spawn(ctx, &request.message, ctx.config.chat.top_k_devotional);

    let category = classify(ctx.model.as_ref(), &ctx.config.models.classification, &request.message).await?;
    metrics::record_chat_category(category.as_str());
    tracing::info!(category = %category, "Chat message classified");

    let (search, instruction) = match category {
        Category::Inappropriate => {
            return Ok(ChatResponse {
                reply: DEFLECTION_REPLY.to_string(),
                model: request.model,
                usage: Usage::default(),
                tool_runs: Vec::new(),
            });
        }
        Category::Casual => {
            drop((theological, devotional));
            (None, None)
        }
        Category::Theological => {
            drop(devotional);
            (Some(theological), Some(THEOLOGICAL_INSTRUCTION))
        }
        Category::CreateDevotional => {
            drop(theological);
            (Some(devotional), Some(DEVOTIONAL_INSTRUCTION))
        }
    };

    let mut tool_runs = Vec::new();
    let mut search_context = None;
    if let Some(search) = search {
        let top_k = search.top_k;
        let (output, is_error) = search.outcome().await;
        search_context = Some(serde_json::to_string_pretty(&output)?);
        tool_runs.push(ToolRun {
            name: SEARCH_TOOL.to_string(),
            arguments: json!({ "question": request.message, "topK": top_k }),
            output,
            is_error,
        });
    }

    let input = build_input(&request.history, &request.message, search_context.as_deref(), instruction);
    let payload = respond_with_temperature_fallback(
        ctx.model.as_ref(),
        ResponsesRequest {
            model: request.model.clone(),
            input,
            temperature: request.temperature.filter(|t| t.is_finite()),
        },
    )
    .await?;

    let reply = extract_response_text(&payload);
    if reply.is_empty() {
        return Err(AppError::external(
            "No text returned from model.",
            Some(DEFAULT_UPSTREAM_STATUS),
            Some(json!({ "model": request.model })),
        ));
    }

    Ok(ChatResponse {
        reply,
        model: request.model,
        usage: Usage::from_responses(&payload),
        tool_runs,
    })
}

//! Tool-call surface
//!
//! Exposes search, restate and devotional as named tools. Arguments are the
//! JSON request body; results come back as a text block plus the structured
//! payload. Operation failures are reported inside a successful response with
//! `isError` set, so a tool client can relay them to its model.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::AppState;
use spurgeon_common::{
    errors::{AppError, Result},
    services::{
        chat::SEARCH_TOOL,
        devotional::{generate_devotional, DevotionalRequest},
        restate::{restate, RestateRequest},
        search::{search, SearchRequest},
    },
    RequestData,
};

pub const RESTATE_TOOL: &str = "spurgeon.restate";
pub const DEVOTIONAL_TOOL: &str = "spurgeon.devotional";

fn string_field(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn number_field(description: &str) -> Value {
    json!({ "type": ["number", "string"], "description": description })
}

fn question_fields() -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("question".into(), string_field("Natural language question."));
    fields.insert("query".into(), string_field("Alternate key for question."));
    fields.insert("topic".into(), string_field("Alternate key for question."));
    fields
}

fn tool(name: &str, title: &str, description: &str, properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "name": name,
        "title": title,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        },
        "annotations": { "readOnlyHint": true },
    })
}

fn catalog() -> Vec<Value> {
    let mut search_fields = question_fields();
    search_fields.insert("topK".into(), number_field("Number of results to return (default 5)."));
    search_fields.insert(
        "contextChars".into(),
        number_field("Extra context chars around the hit (default 200)."),
    );
    search_fields.insert("region".into(), string_field("AWS region (default us-east-2)."));
    search_fields.insert("bucket".into(), string_field("S3 vector bucket (default spurgeon)."));
    search_fields.insert("index".into(), string_field("Vector index name (default sermon-bodies-v1)."));
    search_fields.insert("model".into(), string_field("Embedding model (default text-embedding-3-small)."));

    let mut restate_fields = question_fields();
    restate_fields.insert("model".into(), string_field("Responses model (default gpt-5)."));

    let mut devotional_fields = restate_fields.clone();
    devotional_fields.insert(
        "excerpts".into(),
        json!({
            "type": "array",
            "minItems": 1,
            "description": "Array of excerpts used to write the devotional.",
        }),
    );

    vec![
        tool(
            SEARCH_TOOL,
            "Search Spurgeon Index",
            "Query the Spurgeon vector index. Provide one of question, query, or topic.",
            search_fields,
            &[],
        ),
        tool(
            RESTATE_TOOL,
            "Restate Spurgeon Question",
            "Restate a question into a concise 19th-century retrieval query.",
            restate_fields,
            &[],
        ),
        tool(
            DEVOTIONAL_TOOL,
            "Generate Spurgeon Devotional",
            "Generate a 500-word devotional from excerpts. Excerpts should be an array of {title,url,excerpt}.",
            devotional_fields,
            &["excerpts"],
        ),
    ]
}

pub async fn list_tools() -> Json<Value> {
    Json(json!({ "tools": catalog() }))
}

pub async fn call_tool(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> Result<Response> {
    if !matches!(name.as_str(), SEARCH_TOOL | RESTATE_TOOL | DEVOTIONAL_TOOL) {
        return Err(AppError::NotFound {
            message: format!("Unknown tool: {}", name),
        });
    }

    let data = RequestData::new(arguments(&body), HashMap::new());
    let outcome = run_tool(&state, &name, &data).await;

    let result = match outcome {
        Ok(payload) => json!({
            "content": [{ "type": "text", "text": pretty(&payload) }],
            "structuredContent": payload,
        }),
        Err(err) => {
            tracing::warn!(tool = %name, error = %err, "Tool call failed");
            json!({
                "content": [{ "type": "text", "text": pretty(&err.to_error_body()) }],
                "isError": true,
            })
        }
    };

    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Non-object or unparseable arguments are treated as empty
fn arguments(body: &Bytes) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

async fn run_tool(state: &AppState, name: &str, data: &RequestData) -> Result<Value> {
    let services = &state.services;
    let config = &state.config;

    let payload = match name {
        SEARCH_TOOL => serde_json::to_value(search(services, SearchRequest::from_request(data, config)?).await?)?,
        RESTATE_TOOL => serde_json::to_value(restate(services, RestateRequest::from_request(data, config)?).await?)?,
        _ => serde_json::to_value(
            generate_devotional(services, DevotionalRequest::from_request(data, config)?).await?,
        )?,
    };
    Ok(payload)
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

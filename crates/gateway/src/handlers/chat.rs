//! Chat handler

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use std::collections::HashMap;

use super::request_data;
use crate::AppState;
use spurgeon_common::{
    errors::Result,
    services::chat::{self, ChatRequest, ChatResponse},
};

/// One conversational turn; history is supplied by the caller
pub async fn chat(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<ChatResponse>> {
    let data = request_data(query, &body)?;
    let request = ChatRequest::from_request(&data, &state.config.models.responses)?;
    let response = chat::chat(&state.services, request).await?;

    tracing::info!(
        tool_runs = response.tool_runs.len(),
        output_tokens = response.usage.output_tokens,
        "Chat reply sent"
    );
    Ok(Json(response))
}

//! Question restatement handler

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
    services::restate::{self, RestateRequest, RestateResponse},
};

pub async fn restate(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<RestateResponse>> {
    let data = request_data(query, &body)?;
    let request = RestateRequest::from_request(&data, &state.config)?;
    Ok(Json(restate::restate(&state.services, request).await?))
}

//! API handlers module

pub mod chat;
pub mod devotional;
pub mod health;
pub mod restate;
pub mod search;
pub mod tools;

use axum::body::Bytes;
use spurgeon_common::{errors::Result, RequestData};
use std::collections::HashMap;

/// Normalize a raw body plus query string into the shared request shape
pub fn request_data(query: HashMap<String, String>, body: &Bytes) -> Result<RequestData> {
    RequestData::from_bytes(body, query)
}

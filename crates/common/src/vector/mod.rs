//! Vector index client (AWS S3 Vectors)
//!
//! One top-K nearest-neighbour query per call, requesting metadata and
//! distance. Index coordinates travel with each query since callers may
//! override region, bucket and index per request.

use crate::config::{require_present, AppConfig};
use crate::errors::{AppError, Result, DEFAULT_UPSTREAM_STATUS};
use crate::metrics;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3vectors::config::http::HttpResponse;
use aws_sdk_s3vectors::config::Credentials;
use aws_sdk_s3vectors::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3vectors::operation::query_vectors::QueryVectorsError;
use aws_sdk_s3vectors::types::VectorData;
use aws_sdk_s3vectors::Client as S3VectorsClient;
use aws_smithy_types::{Document, Number};
use aws_types::region::Region;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Instant;

/// Coordinates and payload of one similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub region: String,
    pub bucket: String,
    pub index: String,
    pub top_k: usize,
    pub embedding: Vec<f32>,
}

/// One raw hit; metadata is left as JSON for the caller to interpret
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub key: String,
    pub distance: Option<f32>,
    pub metadata: Value,
}

/// Trait for similarity search backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>>;

    /// Fail early when credentials are missing
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }
}

/// S3 Vectors backend with static credentials
pub struct S3VectorsIndex {
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
}

impl S3VectorsIndex {
    pub fn new(access_key_id: Option<String>, secret_access_key: Option<String>) -> Self {
        Self {
            access_key_id,
            secret_access_key,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.vector.access_key_id.clone(),
            config.vector.secret_access_key.clone(),
        )
    }

    async fn client(&self, region: &str) -> S3VectorsClient {
        let credentials = Credentials::new(
            self.access_key_id.clone().unwrap_or_default(),
            self.secret_access_key.clone().unwrap_or_default(),
            None,
            None,
            "spurgeon-static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .load()
            .await;

        S3VectorsClient::new(&sdk_config)
    }

    async fn run_query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>> {
        self.ensure_configured()?;
        let client = self.client(&query.region).await;
        let top_k = i32::try_from(query.top_k)
            .map_err(|_| AppError::validation("topK must be a positive integer."))?;

        let output = client
            .query_vectors()
            .vector_bucket_name(&query.bucket)
            .index_name(&query.index)
            .top_k(top_k)
            .query_vector(VectorData::Float32(query.embedding.clone()))
            .return_metadata(true)
            .return_distance(true)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(output
            .vectors()
            .iter()
            .map(|hit| VectorMatch {
                key: hit.key().to_string(),
                distance: hit.distance(),
                metadata: hit.metadata().map(document_to_json).unwrap_or(Value::Null),
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for S3VectorsIndex {
    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>> {
        let start = Instant::now();
        let result = self.run_query(query).await;

        metrics::record_vector_query(start.elapsed().as_secs_f64(), &query.index, result.is_ok());
        match &result {
            Ok(matches) => tracing::debug!(
                index = %query.index,
                top_k = query.top_k,
                matches = matches.len(),
                "Vector query complete"
            ),
            Err(e) => tracing::warn!(index = %query.index, error = %e, "Vector query failed"),
        }
        result
    }

    fn ensure_configured(&self) -> Result<()> {
        require_present(&[
            ("AWS_S3_KEY", self.access_key_id.as_deref()),
            ("AWS_S3_SECRET", self.secret_access_key.as_deref()),
        ])
    }
}

fn map_sdk_error(err: SdkError<QueryVectorsError, HttpResponse>) -> AppError {
    let status = err
        .raw_response()
        .map(|r| r.status().as_u16())
        .unwrap_or(DEFAULT_UPSTREAM_STATUS);
    AppError::external(
        format!("S3 Vectors query failed ({})", status),
        Some(status),
        Some(json!({ "error": DisplayErrorContext(&err).to_string() })),
    )
}

/// Convert SDK metadata into JSON
pub fn document_to_json(doc: &Document) -> Value {
    match doc {
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), document_to_json(v)))
                .collect(),
        ),
        Document::Array(items) => Value::Array(items.iter().map(document_to_json).collect()),
        Document::Number(Number::PosInt(n)) => json!(n),
        Document::Number(Number::NegInt(n)) => json!(n),
        Document::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Document::String(s) => Value::String(s.clone()),
        Document::Bool(b) => Value::Bool(*b),
        Document::Null => Value::Null,
    }
}

/// In-memory index for tests: returns its fixed hits, truncated to `top_k`
pub struct MockVectorIndex {
    matches: Vec<VectorMatch>,
    failure: Option<(String, u16)>,
    queries: Mutex<Vec<VectorQuery>>,
}

impl MockVectorIndex {
    pub fn new(matches: Vec<VectorMatch>) -> Self {
        Self {
            matches,
            failure: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// An index whose every query fails with an upstream error
    pub fn failing(message: impl Into<String>, status: u16) -> Self {
        Self {
            matches: Vec::new(),
            failure: Some((message.into(), status)),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, in order
    pub fn queries(&self) -> Vec<VectorQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn query(&self, query: &VectorQuery) -> Result<Vec<VectorMatch>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }
        if let Some((message, status)) = &self.failure {
            return Err(AppError::external(message.clone(), Some(*status), None));
        }
        Ok(self.matches.iter().take(query.top_k).cloned().collect())
    }
}

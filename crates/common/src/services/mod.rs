//! Sermon RAG operations
//!
//! Each operation takes a typed request (built from [`RequestData`] at the
//! boundary) and the shared [`ServiceContext`].
//!
//! [`RequestData`]: crate::request::RequestData

pub mod chat;
pub mod devotional;
pub mod restate;
pub mod search;

use crate::config::AppConfig;
use crate::embeddings::{Embedder, OpenAIEmbedder};
use crate::errors::Result;
use crate::excerpts::ExcerptStore;
use crate::llm::{LanguageModel, OpenAIResponses};
use crate::vector::{S3VectorsIndex, VectorIndex};
use std::sync::Arc;

/// Dependency root shared by every operation
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<AppConfig>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub model: Arc<dyn LanguageModel>,
    pub excerpts: Arc<ExcerptStore>,
}

impl ServiceContext {
    pub fn new(
        config: Arc<AppConfig>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn LanguageModel>,
        excerpts: Arc<ExcerptStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
            model,
            excerpts,
        }
    }

    /// Wire the production providers from configuration
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self> {
        let embedder = Arc::new(OpenAIEmbedder::from_config(&config)?);
        let model = Arc::new(OpenAIResponses::from_config(&config)?);
        let index = Arc::new(S3VectorsIndex::from_config(&config));

        Ok(Self::new(config, embedder, index, model, Arc::new(ExcerptStore::new())))
    }
}

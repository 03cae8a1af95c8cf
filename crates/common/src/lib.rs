//! Spurgeon Common Library
//!
//! Shared code for the gateway and the batch pipeline including:
//! - Error types and handling
//! - Configuration management
//! - Provider clients (embeddings, text generation, vector index)
//! - The sermon body store
//! - Search, restate, devotional and chat operations
//! - Metrics and diagnostics

pub mod config;
pub mod diagnostics;
pub mod embeddings;
pub mod errors;
pub mod excerpts;
pub mod llm;
pub mod metrics;
pub mod request;
pub mod services;
pub mod usage;
pub mod vector;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use request::RequestData;
pub use services::ServiceContext;
pub use usage::Usage;
pub use vector::VectorIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Sermon body store and excerpt windows
//!
//! Bodies live in a line-delimited JSON file (`{"id": .., "body": ..}` per
//! line). Each distinct resolved path is parsed once and kept for the life
//! of the process; concurrent first callers share a single load.

use crate::errors::{AppError, Result};
use crate::metrics;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::OnceCell;

/// Sermon id to full body text
pub type BodyMap = HashMap<String, String>;

/// Process-wide cache of parsed body files
#[derive(Default)]
pub struct ExcerptStore {
    cells: Mutex<HashMap<PathBuf, Arc<OnceCell<Arc<BodyMap>>>>>,
    loads: AtomicUsize,
}

impl ExcerptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the body map for `path`, loading it on first use
    pub async fn get_map(&self, path: impl AsRef<Path>) -> Result<Arc<BodyMap>> {
        let resolved = std::path::absolute(path.as_ref()).map_err(|e| {
            AppError::configuration(format!(
                "Sermon bodies path {:?} is invalid: {}",
                path.as_ref().display().to_string(),
                e
            ))
        })?;

        if !tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
            return Err(AppError::configuration(format!(
                "Sermon bodies file not found at {}.",
                resolved.display()
            )));
        }

        let cell = {
            let mut cells = self.cells.lock().map_err(|_| AppError::Internal {
                message: "excerpt cache lock poisoned".to_string(),
            })?;
            cells.entry(resolved.clone()).or_default().clone()
        };

        metrics::record_cache(cell.initialized(), "sermon_bodies");

        let map = cell
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                load_bodies(&resolved).await.map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(map))
    }

    /// Number of file loads started so far (failed loads included)
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

async fn load_bodies(path: &Path) -> Result<BodyMap> {
    let unreadable = |e: std::io::Error| {
        AppError::configuration(format!("Sermon bodies file at {} could not be read: {}", path.display(), e))
    };

    let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let mut lines = BufReader::new(file).lines();
    let mut map = BodyMap::new();
    let mut line_no = 0usize;

    while let Some(raw) = lines.next_line().await.map_err(unreadable)? {
        line_no += 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let record: Value = serde_json::from_str(line).map_err(|e| {
            AppError::configuration(format!(
                "Invalid JSON on line {} of {}: {}",
                line_no,
                path.display(),
                e
            ))
        })?;

        let id = match &record["id"] {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        let body = record["body"].as_str().unwrap_or_default().to_string();
        map.insert(id, body);
    }

    tracing::info!(path = %path.display(), sermons = map.len(), "Loaded sermon bodies");
    Ok(map)
}

/// Slice `body` around `[offset_start, offset_end)`, padded by `context_chars`
/// on each side and clipped to the body. Offsets count chars, not bytes.
pub fn excerpt_window(body: &str, offset_start: usize, offset_end: usize, context_chars: usize) -> String {
    let start = offset_start.saturating_sub(context_chars);
    let end = offset_end.saturating_add(context_chars);
    if start >= end {
        return String::new();
    }
    body.chars().skip(start).take(end - start).collect()
}

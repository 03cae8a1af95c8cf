//! Question → restatement → search → devotional, timed step by step

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use spurgeon_common::{
    errors::Result,
    services::{
        devotional::{generate_devotional, Devotional, DevotionalRequest},
        restate::{restate, RestateRequest},
        search::{search, SearchRequest, SearchResult},
    },
    ServiceContext,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::cost::{CostModel, StepMetrics, Summary};

#[derive(Debug, Clone, Serialize)]
pub struct Restated {
    pub original: String,
    pub restated: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Excerpts {
    pub query: String,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    pub restate_question: StepMetrics,
    pub query_vectors: StepMetrics,
    pub generate_devotional: StepMetrics,
    pub summary: Summary,
}

/// Everything one run produced, written out as the result file
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub question: String,
    pub restated: Restated,
    pub excerpts: Excerpts,
    pub devotional: Devotional,
    pub metrics: PipelineMetrics,
}

/// Await `step` and return its output with wall-clock milliseconds
async fn timed<T, F>(label: &str, step: F) -> Result<(T, f64)>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let output = step.await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(step = label, elapsed_ms, "Step complete");
    Ok((output, elapsed_ms))
}

/// Run the three steps in order; the first failure aborts the run
pub async fn run_pipeline(ctx: &ServiceContext, question: &str, top_k: i64) -> Result<PipelineReport> {
    let config = &ctx.config;

    let (restated, restate_ms) = timed("restate_question", restate(ctx, RestateRequest::new(question, config))).await?;

    let (found, search_ms) = timed(
        "query_vectors",
        search(ctx, SearchRequest::new(restated.restated.clone(), top_k, config)),
    )
    .await?;

    let excerpts = found
        .results
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let (devotional, devotional_ms) = timed(
        "generate_devotional",
        generate_devotional(ctx, DevotionalRequest::new(restated.restated.clone(), excerpts, config)),
    )
    .await?;

    let restate_question = StepMetrics::new(restate_ms, restated.usage, CostModel::Gpt5);
    let query_vectors = StepMetrics::new(search_ms, found.usage, CostModel::Embeddings);
    let generate = StepMetrics::new(devotional_ms, devotional.usage, CostModel::Gpt5);
    let summary = Summary::of(&[&restate_question, &query_vectors, &generate]);

    Ok(PipelineReport {
        question: question.to_string(),
        restated: Restated {
            original: restated.original,
            restated: restated.restated,
            model: restated.model,
        },
        excerpts: Excerpts {
            query: found.query,
            results: found.results,
        },
        devotional: devotional.devotional,
        metrics: PipelineMetrics {
            restate_question,
            query_vectors,
            generate_devotional: generate,
            summary,
        },
    })
}

/// `qa_pipeline_<ISO-8601 with ':' and '.' replaced by '-'>.json`
pub fn report_file_name(at: DateTime<Utc>) -> String {
    let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true).replace([':', '.'], "-");
    format!("qa_pipeline_{}.json", stamp)
}

/// Write the report as pretty JSON under `dir`, creating it if needed; returns the absolute path
pub fn write_report(report: &PipelineReport, dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = std::path::absolute(dir.join(report_file_name(at)))?;
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}

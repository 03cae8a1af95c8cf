//! Spurgeon QA Pipeline
//!
//! Batch driver: restates a question, searches the sermon index with the
//! restatement, generates a devotional from the hits and writes a timestamped
//! JSON report with per-step timing, token usage and estimated cost.

mod cost;
mod orchestrator;

use anyhow::bail;
use clap::Parser;
use spurgeon_common::{config::AppConfig, ServiceContext, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: qa-pipeline --question \"...\" [--topk 5]";

#[derive(Parser, Debug)]
#[command(name = "qa-pipeline", version, about = "Question to devotional, with timing and cost")]
struct Cli {
    /// Question to answer
    #[arg(long)]
    question: Option<String>,

    /// Number of excerpts to retrieve
    #[arg(long = "topk")]
    top_k: Option<i64>,

    /// Directory the report is written to
    #[arg(long, env = "QA_RESULTS_DIR", default_value = "results")]
    results_dir: PathBuf,

    /// `<question> [topk]` when the flags are not used
    positional: Vec<String>,
}

impl Cli {
    /// `--question` wins over the first positional
    fn question(&self) -> String {
        self.question
            .clone()
            .filter(|q| !q.is_empty())
            .or_else(|| self.positional.first().cloned())
            .unwrap_or_default()
    }

    /// A numeric second positional wins over `--topk`
    fn top_k(&self, default_top_k: i64) -> i64 {
        self.positional
            .get(1)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .or(self.top_k)
            .unwrap_or(default_top_k)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let question = cli.question();
    if question.trim().is_empty() {
        bail!(USAGE);
    }

    let config = Arc::new(AppConfig::load()?);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let top_k = cli.top_k(config.search.top_k as i64);
    info!(version = VERSION, top_k, "Starting QA pipeline");

    let services = ServiceContext::from_config(config)?;
    let report = orchestrator::run_pipeline(&services, &question, top_k).await?;
    let path = orchestrator::write_report(&report, &cli.results_dir, chrono::Utc::now())?;

    info!(
        total_ms = report.metrics.summary.total_timings_ms,
        total_cost = report.metrics.summary.total_estimated_cost,
        "Pipeline complete"
    );
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("qa-pipeline").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags() {
        let cli = parse(&["--question", "What is grace?", "--topk", "3"]);
        assert_eq!(cli.question(), "What is grace?");
        assert_eq!(cli.top_k(5), 3);
        assert_eq!(cli.results_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_positional_question_and_topk() {
        let cli = parse(&["What is grace?", "7"]);
        assert_eq!(cli.question(), "What is grace?");
        assert_eq!(cli.top_k(5), 7);
    }

    #[test]
    fn test_non_numeric_positional_topk_ignored() {
        let cli = parse(&["What is grace?", "many", "--topk", "2"]);
        assert_eq!(cli.top_k(5), 2);

        let cli = parse(&["What is grace?"]);
        assert_eq!(cli.top_k(5), 5);
    }

    #[test]
    fn test_missing_question_is_blank() {
        let cli = parse(&["--results-dir", "/tmp/out"]);
        assert!(cli.question().is_empty());
        assert_eq!(cli.results_dir, PathBuf::from("/tmp/out"));
    }
}

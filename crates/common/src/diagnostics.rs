//! Opt-in timing and memory probes
//!
//! A [`Probe`] logs elapsed time and resident-set growth when dropped, so it
//! reports on every exit path of the scope that owns it.

use crate::config::DiagnosticsConfig;
use std::time::Instant;

/// Page size assumed when converting `/proc/self/statm` pages to bytes
const PAGE_SIZE: u64 = 4096;

pub struct Probe {
    label: &'static str,
    start: Instant,
    start_rss: Option<u64>,
    log_memory: bool,
    log_timing: bool,
}

impl Probe {
    pub fn start(label: &'static str, config: &DiagnosticsConfig) -> Self {
        Self {
            label,
            start: Instant::now(),
            start_rss: if config.log_memory { resident_set_bytes() } else { None },
            log_memory: config.log_memory,
            log_timing: config.log_timing,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        if !self.log_memory && !self.log_timing {
            return;
        }

        let end_rss = if self.log_memory { resident_set_bytes() } else { None };
        let delta = match (self.start_rss, end_rss) {
            (Some(start), Some(end)) => Some(end as i64 - start as i64),
            _ => None,
        };

        tracing::info!(
            probe = self.label,
            elapsed_ms = self.elapsed_ms(),
            rss_start = ?self.start_rss,
            rss_end = ?end_rss,
            rss_delta = ?delta,
            "Diagnostics"
        );
    }
}

/// Current resident set size in bytes; `None` where `/proc` is unavailable
pub fn resident_set_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE)
}

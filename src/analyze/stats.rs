//! Per-platform reliability aggregate for one run.
//!
//! Built once per platform after its adapter returns; the store replaces the previous
//! row for the platform instead of appending.

use serde::{Deserialize, Serialize};

use crate::ingest::fetch::PlatformTelemetry;
use crate::ingest::types::{Platform, ScoredItem, SourceOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRunStats {
    pub platform: Platform,
    /// Declared endpoints attempted this run.
    pub source_count: usize,
    /// Items accepted after threshold, dedup and cap.
    pub content_count: usize,
    /// Successful sources / attempted sources; 1.0 with no sources.
    pub success_rate: f64,
    pub avg_relevance: f64,
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    /// Sources that failed to fetch or parse.
    pub failure_count: usize,
    pub retry_count: u32,
    pub fallback_used: bool,
}

impl PlatformRunStats {
    pub fn build(
        platform: Platform,
        sources: &[SourceOutcome],
        items: &[ScoredItem],
        telemetry: &PlatformTelemetry,
        fallback_used: bool,
    ) -> Self {
        let source_count = sources.len();
        let failure_count = sources.iter().filter(|s| !s.ok).count();
        let success_rate = if source_count == 0 {
            1.0
        } else {
            (source_count - failure_count) as f64 / source_count as f64
        };
        let avg_relevance = if items.is_empty() {
            0.0
        } else {
            items.iter().map(|i| i.relevance_score).sum::<f64>() / items.len() as f64
        };

        let mut latencies = telemetry.latencies_ms.clone();
        latencies.sort_by(|a, b| a.total_cmp(b));

        Self {
            platform,
            source_count,
            content_count: items.len(),
            success_rate,
            avg_relevance,
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p90_ms: percentile(&latencies, 90.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            failure_count,
            retry_count: telemetry.retries,
            fallback_used,
        }
    }
}

/// Nearest-rank percentile over an ascending slice; 0.0 when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_percentiles() {
        let v: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&v, 50.0), 5.0);
        assert_eq!(percentile(&v, 90.0), 9.0);
        assert_eq!(percentile(&v, 99.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 1.0), 7.0);
    }

    #[test]
    fn success_rate_counts_failed_sources() {
        let sources = vec![
            SourceOutcome::ok("https://a.test"),
            SourceOutcome::failed("https://b.test", "HTTP 500"),
            SourceOutcome::failed("https://c.test", "parse"),
            SourceOutcome::ok("https://d.test"),
        ];
        let telemetry = PlatformTelemetry {
            latencies_ms: vec![30.0, 10.0, 20.0],
            retries: 6,
            failures: 1,
        };
        let s = PlatformRunStats::build(Platform::News, &sources, &[], &telemetry, false);
        assert_eq!(s.source_count, 4);
        assert_eq!(s.failure_count, 2);
        assert_eq!(s.success_rate, 0.5);
        assert_eq!(s.latency_p50_ms, 20.0);
        assert_eq!(s.latency_p99_ms, 30.0);
        assert_eq!(s.retry_count, 6);
        assert_eq!(s.avg_relevance, 0.0);
    }

    #[test]
    fn no_sources_is_fully_successful() {
        let s = PlatformRunStats::build(
            Platform::Rss,
            &[],
            &[],
            &PlatformTelemetry::default(),
            false,
        );
        assert_eq!(s.success_rate, 1.0);
    }
}

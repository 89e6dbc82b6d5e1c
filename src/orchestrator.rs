// src/orchestrator.rs
//! Drives one run: every enabled platform in turn through its adapter and the shared
//! pipeline, then persistence, analysis, reports and the alert decision.
//!
//! Failures stay inside the platform that produced them. Cancellation is honoured only
//! between platforms; a platform that already started runs to completion.

use chrono::Utc;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::analyze::{analyze, Analysis, PlatformRunStats};
use crate::config::ScraperConfig;
use crate::fingerprint::DedupIndex;
use crate::ingest::circuit::CircuitBreaker;
use crate::ingest::fetch::{Fetcher, HttpTransport, RetryPolicy};
use crate::ingest::types::{AdapterOutput, Platform, PlatformAdapter, RunCache, ScoredItem};
use crate::ingest::{process_candidates, PipelineCounts, PipelineSettings};
use crate::notify::{dispatch, evaluate_alert, AlertPayload, AlertSink};
use crate::report::{write_json, write_reports, ReportPaths};
use crate::scoring::KeywordScorer;
use crate::store::Store;

/// Cooperative cancellation checked at each platform boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one run needs, injected up front.
pub struct ScrapeContext {
    pub run_id: String,
    pub config: ScraperConfig,
    pub fetcher: Fetcher,
    pub scorer: KeywordScorer,
    pub dedup: DedupIndex,
    pub store: Option<Store>,
    pub alert_sink: Option<Box<dyn AlertSink>>,
    pub cancel: CancelFlag,
    transport: Arc<dyn HttpTransport>,
}

impl ScrapeContext {
    /// Fresh run id, breaker, retry policy and scorer from `config`. No store, no sink.
    pub fn new(config: ScraperConfig, transport: Arc<dyn HttpTransport>) -> anyhow::Result<Self> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let scorer = KeywordScorer::new(&config.minnesota_keywords, &config.coffee_keywords)?;
        let fetcher = build_fetcher(
            &run_id,
            &config,
            transport.clone(),
            RetryPolicy::from_settings(&config.fetch),
        );
        Ok(Self {
            run_id,
            config,
            fetcher,
            scorer,
            dedup: DedupIndex::new(),
            store: None,
            alert_sink: None,
            cancel: CancelFlag::new(),
            transport,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.fetcher = build_fetcher(&self.run_id, &self.config, self.transport.clone(), policy);
        self
    }

    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_alert_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

fn build_fetcher(
    run_id: &str,
    config: &ScraperConfig,
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
) -> Fetcher {
    let breaker = Arc::new(CircuitBreaker::new(
        config.circuit.threshold,
        config.circuit.reset_after_secs,
    ));
    Fetcher::new(run_id, transport, breaker, policy, config.user_agent_pool())
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub analysis: Analysis,
    /// Accepted items in platform order, adapter-yield order within a platform.
    pub items: Vec<ScoredItem>,
    pub counts: BTreeMap<Platform, PipelineCounts>,
    /// Rows newly written to `content` (0 on dry run or without a store).
    pub inserted: usize,
    pub skipped: Vec<Platform>,
    pub reports: Option<ReportPaths>,
    pub alert: Option<AlertPayload>,
    pub alert_delivered: bool,
}

impl ScrapeContext {
    pub async fn run(&mut self, adapters: &[Box<dyn PlatformAdapter>]) -> RunOutcome {
        let enabled = self.config.enabled_platforms();
        let dry_run = self.config.dry_run;
        info!(
            event = "run_started",
            run_id = %self.run_id,
            platforms = ?enabled,
            dry_run,
            "run started"
        );

        let mut cache = RunCache::new();
        let mut items: Vec<ScoredItem> = Vec::new();
        let mut stats: Vec<PlatformRunStats> = Vec::new();
        let mut counts = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut inserted = 0;

        for adapter in adapters {
            let platform = adapter.platform();
            if !enabled.contains(&platform) {
                continue;
            }
            if self.cancel.is_cancelled() {
                info!(
                    event = "platform_skipped",
                    run_id = %self.run_id,
                    platform = %platform,
                    "run cancelled before platform"
                );
                skipped.push(platform);
                continue;
            }

            let out = match AssertUnwindSafe(adapter.scrape(&self.fetcher, &cache))
                .catch_unwind()
                .await
            {
                Ok(out) => out,
                Err(_) => {
                    error!(
                        event = "platform_failed",
                        run_id = %self.run_id,
                        platform = %platform,
                        "adapter panicked"
                    );
                    AdapterOutput::default()
                }
            };

            let settings = PipelineSettings {
                threshold: self.config.relevance_thresholds.for_platform(platform),
                max_body_chars: self.config.max_body_chars,
                limit: self.config.per_platform_limit,
            };
            // Fallback candidates are another platform's items re-attributed; they are
            // already in the run index, so they dedup only against each other.
            let mut scoped = DedupIndex::new();
            let dedup = if out.fallback_used {
                &mut scoped
            } else {
                &mut self.dedup
            };
            let (accepted, c) = process_candidates(out.candidates, &self.scorer, dedup, &settings);
            let st = PlatformRunStats::build(
                platform,
                &out.sources,
                &accepted,
                &self.fetcher.telemetry(platform),
                out.fallback_used,
            );
            cache.put(platform, out.payloads);

            if st.source_count > 0 && st.failure_count == st.source_count {
                warn!(
                    event = "platform_failed",
                    run_id = %self.run_id,
                    platform = %platform,
                    sources = st.source_count,
                    "every source failed"
                );
            } else {
                info!(
                    event = "platform_done",
                    run_id = %self.run_id,
                    platform = %platform,
                    candidates = c.candidates,
                    kept = c.kept,
                    below_threshold = c.below_threshold,
                    duplicates = c.duplicates,
                    capped = c.capped,
                    success_rate = st.success_rate,
                    "platform done"
                );
            }

            inserted += self.persist_platform(&accepted, &st);
            counts.insert(platform, c);
            stats.push(st);
            items.extend(accepted);
        }

        let analysis = analyze(&self.run_id, Utc::now(), stats, &items);
        self.persist_snapshot(&analysis);

        let reports = match write_reports(&self.config.report_dir, &analysis, &items) {
            Ok(paths) => Some(paths),
            Err(e) => {
                warn!(
                    event = "report_failed",
                    run_id = %self.run_id,
                    error = %e,
                    "could not write reports"
                );
                None
            }
        };
        if let Some(path) = &self.config.output_json {
            if let Err(e) = write_json(path, &analysis, &items) {
                warn!(
                    event = "json_failed",
                    run_id = %self.run_id,
                    error = %e,
                    "could not write json dump"
                );
            }
        }

        let alert = evaluate_alert(&analysis, self.config.alert_success_rate_threshold);
        let mut alert_delivered = false;
        if let Some(payload) = &alert {
            match &self.alert_sink {
                Some(sink) => alert_delivered = dispatch(sink.as_ref(), payload).await,
                None => info!(
                    run_id = %self.run_id,
                    avg_success_rate = payload.avg_success_rate,
                    "success rate below threshold; no alert webhook configured"
                ),
            }
        }

        info!(
            event = "run_finished",
            run_id = %self.run_id,
            items = items.len(),
            inserted,
            confidence = analysis.confidence_score,
            skipped = skipped.len(),
            "run finished"
        );

        RunOutcome {
            run_id: self.run_id.clone(),
            analysis,
            items,
            counts,
            inserted,
            skipped,
            reports,
            alert,
            alert_delivered,
        }
    }

    fn persist_platform(&mut self, items: &[ScoredItem], stats: &PlatformRunStats) -> usize {
        if self.config.dry_run {
            info!(
                event = "dry_run_skip_store",
                run_id = %self.run_id,
                platform = %stats.platform,
                items = items.len(),
                "dry run: not storing platform results"
            );
            return 0;
        }
        let Some(store) = self.store.as_mut() else {
            return 0;
        };

        let inserted = match store.insert_content(&self.run_id, items) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    event = "store_failed",
                    run_id = %self.run_id,
                    platform = %stats.platform,
                    error = %e,
                    "content insert failed"
                );
                0
            }
        };
        if let Err(e) = store.replace_platform_performance(&self.run_id, stats) {
            warn!(
                event = "store_failed",
                run_id = %self.run_id,
                platform = %stats.platform,
                error = %e,
                "platform performance write failed"
            );
        }
        inserted
    }

    fn persist_snapshot(&mut self, analysis: &Analysis) {
        if self.config.dry_run {
            info!(
                event = "dry_run_skip_store",
                run_id = %self.run_id,
                "dry run: not storing trend snapshot"
            );
            return;
        }
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.append_trend_snapshot(&analysis.snapshot()) {
                warn!(
                    event = "store_failed",
                    run_id = %self.run_id,
                    error = %e,
                    "trend snapshot write failed"
                );
            }
        }
    }
}

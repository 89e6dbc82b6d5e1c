// src/notify/mod.rs
//! Low-success-rate alerting. The decision is pure; delivery goes through an
//! [`AlertSink`] and its failures are only ever logged.

pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::Analysis;
use crate::error::AlertDeliveryError;
use crate::ingest::types::Platform;

pub use webhook::WebhookNotifier;

pub const LOW_SUCCESS_RATE_EVENT: &str = "low_success_rate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRate {
    pub platform: Platform,
    pub success_rate: f64,
    pub failure_count: usize,
    pub source_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub event: String,
    pub run_id: String,
    pub avg_success_rate: f64,
    pub threshold: f64,
    pub platforms: Vec<PlatformRate>,
}

/// Alert iff the mean per-platform success rate is strictly below `threshold`.
/// A run that attempted no platform never alerts.
pub fn evaluate_alert(analysis: &Analysis, threshold: f64) -> Option<AlertPayload> {
    let avg = analysis.avg_success_rate?;
    if avg >= threshold {
        return None;
    }
    Some(AlertPayload {
        event: LOW_SUCCESS_RATE_EVENT.to_string(),
        run_id: analysis.run_id.clone(),
        avg_success_rate: avg,
        threshold,
        platforms: analysis
            .platforms
            .iter()
            .map(|s| PlatformRate {
                platform: s.platform,
                success_rate: s.success_rate,
                failure_count: s.failure_count,
                source_count: s.source_count,
            })
            .collect(),
    })
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, payload: &AlertPayload) -> Result<(), AlertDeliveryError>;
}

/// Deliver and log the outcome. Returns whether the sink acknowledged.
pub async fn dispatch(sink: &dyn AlertSink, payload: &AlertPayload) -> bool {
    match sink.send(payload).await {
        Ok(()) => {
            info!(
                event = "alert_sent",
                run_id = %payload.run_id,
                avg_success_rate = payload.avg_success_rate,
                threshold = payload.threshold,
                "low success rate alert delivered"
            );
            true
        }
        Err(e) => {
            warn!(
                event = "alert_failed",
                run_id = %payload.run_id,
                error = %e,
                "low success rate alert not delivered"
            );
            false
        }
    }
}

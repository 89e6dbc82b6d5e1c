// src/lib.rs
// Library surface for the binary and integration tests.

pub mod analyze;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod notify;
pub mod orchestrator;
pub mod report;
pub mod scoring;
pub mod store;

pub use crate::config::ScraperConfig;
pub use crate::orchestrator::{CancelFlag, RunOutcome, ScrapeContext};

// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use coffee_scout::config::ScraperConfig;
use coffee_scout::error::TransportError;
use coffee_scout::ingest::fetch::{HttpResponse, HttpTransport, RetryPolicy};
use coffee_scout::ingest::types::{
    AdapterOutput, Candidate, Platform, PlatformAdapter, RawItem, RunCache, SourceOutcome,
};
use coffee_scout::ingest::fetch::Fetcher;
use coffee_scout::ScrapeContext;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Status(u16),
    Fail(String),
    /// Sleep before answering 200 with an empty body.
    Slow(Duration),
}

/// Scripted transport: per-url queue first, then the url's fixed reply, else 404.
#[derive(Default)]
pub struct MockTransport {
    fixed: Mutex<HashMap<String, Reply>>,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, reply: Reply) -> Self {
        self.fixed.lock().unwrap().insert(url.to_string(), reply);
        self
    }

    pub fn sequence(self, url: &str, replies: Vec<Reply>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, ua)| ua.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), user_agent.to_string()));
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|q| q.pop_front());
        let reply = queued.or_else(|| self.fixed.lock().unwrap().get(url).cloned());
        match reply {
            Some(Reply::Ok(body)) => Ok(HttpResponse { status: 200, body }),
            Some(Reply::Status(status)) => Ok(HttpResponse {
                status,
                body: String::new(),
            }),
            Some(Reply::Fail(msg)) => Err(TransportError(msg)),
            Some(Reply::Slow(d)) => {
                tokio::time::sleep(d).await;
                Ok(HttpResponse {
                    status: 200,
                    body: String::new(),
                })
            }
            None => Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Adapter that returns canned candidates without touching the network.
pub struct StaticAdapter {
    pub platform: Platform,
    pub candidates: Vec<Candidate>,
    pub sources: Vec<SourceOutcome>,
}

impl StaticAdapter {
    pub fn new(platform: Platform, items: &[(&str, &str)]) -> Self {
        Self {
            platform,
            candidates: items.iter().map(|(t, b)| candidate(platform, t, b)).collect(),
            sources: vec![SourceOutcome::ok(format!("https://{platform}.test/feed"))],
        }
    }
}

#[async_trait]
impl PlatformAdapter for StaticAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn scrape(&self, _fetcher: &Fetcher, _cache: &RunCache) -> AdapterOutput {
        AdapterOutput {
            candidates: self.candidates.clone(),
            payloads: Vec::new(),
            sources: self.sources.clone(),
            fallback_used: false,
        }
    }
}

pub fn candidate(platform: Platform, title: &str, body: &str) -> Candidate {
    Candidate::new(RawItem {
        platform,
        source_url: format!("https://{platform}.test/{}", title.len()),
        title: title.to_string(),
        body: body.to_string(),
        author: None,
        published_at: None,
    })
}

/// Config with no real endpoints and reports under `dir`.
pub fn test_config(dir: &std::path::Path) -> ScraperConfig {
    let mut cfg = ScraperConfig::default();
    cfg.report_dir = dir.join("reports");
    cfg.db_path = dir.join("test.db");
    cfg.sources.reddit.clear();
    cfg.sources.forums.clear();
    cfg.sources.rss.clear();
    cfg.sources.news.clear();
    cfg.sources.blogs.clear();
    cfg
}

pub fn context(cfg: ScraperConfig, transport: Arc<MockTransport>) -> ScrapeContext {
    ScrapeContext::new(cfg, transport)
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate())
}

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

// src/ingest/providers/forum.rs
//! Forum endpoints speak the same JSON listing format as Reddit. When the forum's own
//! endpoints yield nothing, the Reddit payloads already fetched this run are re-parsed
//! and attributed to forums instead of being fetched again.

use async_trait::async_trait;
use tracing::info;

use crate::ingest::fetch::Fetcher;
use crate::ingest::providers::reddit::{parse_listing, RedditAdapter};
use crate::ingest::types::{AdapterOutput, Platform, PlatformAdapter, RunCache};

pub struct ForumAdapter {
    inner: RedditAdapter,
}

impl ForumAdapter {
    pub fn new(endpoints: Vec<String>, concurrency: usize) -> Self {
        Self {
            inner: RedditAdapter::for_platform(Platform::Forums, endpoints, concurrency),
        }
    }
}

#[async_trait]
impl PlatformAdapter for ForumAdapter {
    fn platform(&self) -> Platform {
        Platform::Forums
    }

    async fn scrape(&self, fetcher: &Fetcher, cache: &RunCache) -> AdapterOutput {
        let mut out = self.inner.scrape(fetcher, cache).await;
        if !out.candidates.is_empty() {
            return out;
        }

        let cached = cache.get(Platform::Reddit);
        if cached.is_empty() {
            return out;
        }
        for payload in cached {
            // Reddit already reported its own parse failures.
            if let Ok(mut cands) = parse_listing(Platform::Forums, &payload.url, &payload.body) {
                out.candidates.append(&mut cands);
            }
        }
        out.fallback_used = true;
        info!(
            event = "forum_fallback",
            run_id = fetcher.run_id(),
            platform = "forums",
            cached_payloads = cached.len(),
            candidates = out.candidates.len(),
            "forum endpoints empty; re-parsed cached reddit payloads"
        );
        out
    }
}

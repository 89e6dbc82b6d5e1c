// src/ingest/providers/reddit.rs
//! Reddit-style JSON listings (`/search.json`, `/r/<sub>/new.json`, post pages).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::ParseError;
use crate::ingest::fetch::Fetcher;
use crate::ingest::normalize_text;
use crate::ingest::providers::fetch_all;
use crate::ingest::types::{
    AdapterOutput, Candidate, EngagementSignals, FetchedPayload, Platform, PlatformAdapter,
    RawItem, RunCache, SourceOutcome,
};

const REDDIT_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    #[serde(default)]
    kind: String,
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    permalink: Option<String>,
    url: Option<String>,
    created_utc: Option<f64>,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    num_comments: f64,
    upvote_ratio: Option<f64>,
}

fn post_to_candidate(platform: Platform, endpoint: &str, p: Post) -> Option<Candidate> {
    let title = normalize_text(&p.title);
    if title.is_empty() {
        return None;
    }
    let source_url = p
        .permalink
        .map(|link| format!("{REDDIT_BASE}{link}"))
        .or(p.url)
        .unwrap_or_else(|| endpoint.to_string());
    let published_at = p
        .created_utc
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0));
    let raw = RawItem {
        platform,
        source_url,
        title,
        body: normalize_text(&p.selftext),
        author: p.author.filter(|a| !a.is_empty() && a != "[deleted]"),
        published_at,
    };
    Some(Candidate::new(raw).with_signals(EngagementSignals {
        score: p.score,
        comments: p.num_comments,
        ratio: p.upvote_ratio.unwrap_or(1.0),
    }))
}

fn listing_posts(listings: Vec<Listing>) -> impl Iterator<Item = Post> {
    listings
        .into_iter()
        .flat_map(|l| l.data.children)
        .filter(|c| c.kind.is_empty() || c.kind == "t3")
        .map(|c| c.data)
}

/// Parse one payload. Primary shape is a single listing object; if that yields nothing
/// the payload is read as an array of listings (what post pages return).
pub fn parse_listing(
    platform: Platform,
    endpoint: &str,
    body: &str,
) -> Result<Vec<Candidate>, ParseError> {
    let primary: Vec<Candidate> = match serde_json::from_str::<Listing>(body) {
        Ok(listing) => listing_posts(vec![listing])
            .filter_map(|p| post_to_candidate(platform, endpoint, p))
            .collect(),
        Err(_) => Vec::new(),
    };
    if !primary.is_empty() {
        return Ok(primary);
    }

    match serde_json::from_str::<Vec<Listing>>(body) {
        Ok(listings) => Ok(listing_posts(listings)
            .filter_map(|p| post_to_candidate(platform, endpoint, p))
            .collect()),
        Err(e) => {
            // A well-formed but empty listing is not an error.
            if serde_json::from_str::<Listing>(body).is_ok() {
                Ok(Vec::new())
            } else {
                Err(ParseError::new(endpoint, format!("not a listing: {e}")))
            }
        }
    }
}

/// Reddit JSON adapter. Also reused as-is for forum endpoints with `platform = Forums`.
pub struct RedditAdapter {
    platform: Platform,
    endpoints: Vec<String>,
    concurrency: usize,
}

impl RedditAdapter {
    pub fn new(endpoints: Vec<String>, concurrency: usize) -> Self {
        Self::for_platform(Platform::Reddit, endpoints, concurrency)
    }

    pub fn for_platform(platform: Platform, endpoints: Vec<String>, concurrency: usize) -> Self {
        Self {
            platform,
            endpoints,
            concurrency,
        }
    }
}

#[async_trait]
impl PlatformAdapter for RedditAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn scrape(&self, fetcher: &Fetcher, _cache: &RunCache) -> AdapterOutput {
        let mut out = AdapterOutput::default();
        let fetched = fetch_all(
            fetcher,
            self.platform,
            self.endpoints.clone(),
            self.concurrency,
        )
        .await;

        for (url, res) in fetched {
            let body = match res {
                Ok(body) => body,
                Err(e) => {
                    out.sources.push(SourceOutcome::failed(&url, &e));
                    continue;
                }
            };
            match parse_listing(self.platform, &url, &body) {
                Ok(mut cands) => {
                    out.candidates.append(&mut cands);
                    out.sources.push(SourceOutcome::ok(&url));
                }
                Err(e) => {
                    warn!(
                        run_id = fetcher.run_id(),
                        platform = %self.platform,
                        url = %url,
                        error = %e,
                        "listing parse failed"
                    );
                    out.sources.push(SourceOutcome::failed(&url, &e));
                }
            }
            out.payloads.push(FetchedPayload { url, body });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
      "kind": "Listing",
      "data": { "children": [
        { "kind": "t3", "data": {
            "title": "Best espresso in Minneapolis?",
            "selftext": "Looking for a cafe near &amp; around Loring Park",
            "author": "beanfan",
            "permalink": "/r/Minneapolis/comments/abc/best_espresso/",
            "created_utc": 1714000000.0,
            "score": 42, "num_comments": 10, "upvote_ratio": 0.9 } },
        { "kind": "t1", "data": { "body": "a comment" } },
        { "kind": "t3", "data": { "title": "", "selftext": "no title" } }
      ] }
    }"#;

    #[test]
    fn parses_posts_and_skips_comments_and_untitled() {
        let c = parse_listing(Platform::Reddit, "https://x.test/search.json", LISTING).unwrap();
        assert_eq!(c.len(), 1);
        let item = &c[0];
        assert_eq!(item.raw.title, "Best espresso in Minneapolis?");
        assert_eq!(item.raw.body, "Looking for a cafe near & around Loring Park");
        assert_eq!(
            item.raw.source_url,
            "https://www.reddit.com/r/Minneapolis/comments/abc/best_espresso/"
        );
        assert_eq!(item.raw.author.as_deref(), Some("beanfan"));
        assert_eq!(item.signals.score, 42.0);
        assert_eq!(item.signals.ratio, 0.9);
        assert!(item.raw.published_at.is_some());
    }

    #[test]
    fn falls_back_to_listing_array() {
        let body = format!("[{LISTING}, {{\"kind\":\"Listing\",\"data\":{{\"children\":[]}}}}]");
        let c = parse_listing(Platform::Forums, "https://x.test/post.json", &body).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].raw.platform, Platform::Forums);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_listing(Platform::Reddit, "https://x.test/a", "<html>").unwrap_err();
        assert_eq!(err.source_url, "https://x.test/a");
    }

    #[test]
    fn empty_listing_is_ok() {
        let c = parse_listing(
            Platform::Reddit,
            "https://x.test/a",
            r#"{"data":{"children":[]}}"#,
        )
        .unwrap();
        assert!(c.is_empty());
    }
}

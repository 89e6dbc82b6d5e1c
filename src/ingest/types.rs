// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::ingest::fetch::Fetcher;

/// One class of content source with its own fetch/parse strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    News,
    #[serde(alias = "blog")]
    Blogs,
    Rss,
    #[serde(alias = "forum")]
    Forums,
}

impl Platform {
    /// Declared run order.
    pub const ALL: [Platform; 5] = [
        Platform::Reddit,
        Platform::News,
        Platform::Blogs,
        Platform::Rss,
        Platform::Forums,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::News => "news",
            Platform::Blogs => "blogs",
            Platform::Rss => "rss",
            Platform::Forums => "forums",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(Platform::Reddit),
            "news" => Ok(Platform::News),
            "blogs" | "blog" => Ok(Platform::Blogs),
            "rss" => Ok(Platform::Rss),
            "forums" | "forum" => Ok(Platform::Forums),
            other => Err(format!("unknown platform `{other}`")),
        }
    }
}

/// Normalized item produced by an adapter from one raw response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    pub platform: Platform,
    pub source_url: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Source-native popularity signals. `ratio` is 1.0 where the source has no approval ratio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngagementSignals {
    pub score: f64,
    pub comments: f64,
    pub ratio: f64,
}

impl Default for EngagementSignals {
    fn default() -> Self {
        Self {
            score: 0.0,
            comments: 0.0,
            ratio: 1.0,
        }
    }
}

/// Adapter output before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub raw: RawItem,
    pub signals: EngagementSignals,
}

impl Candidate {
    pub fn new(raw: RawItem) -> Self {
        Self {
            raw,
            signals: EngagementSignals::default(),
        }
    }

    pub fn with_signals(mut self, signals: EngagementSignals) -> Self {
        self.signals = signals;
        self
    }
}

/// A fetched item after scoring and fingerprinting. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub raw: RawItem,
    pub relevance_score: f64,
    pub engagement_score: f64,
    pub content_hash: String,
    pub simhash: u64,
    pub token_count: usize,
    pub truncated: bool,
    pub minnesota_mentions: usize,
    pub coffee_mentions: usize,
}

/// Raw payload kept for the rest of the run (the forum fallback re-reads Reddit's).
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub url: String,
    pub body: String,
}

/// What happened to one declared endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceOutcome {
    pub url: String,
    pub ok: bool,
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn ok(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ok: true,
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl ToString) -> Self {
        Self {
            url: url.into(),
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdapterOutput {
    pub candidates: Vec<Candidate>,
    pub payloads: Vec<FetchedPayload>,
    pub sources: Vec<SourceOutcome>,
    /// Set when candidates came from another platform's payloads instead of own fetches.
    pub fallback_used: bool,
}

/// Payloads fetched earlier in the same run, keyed by platform.
#[derive(Debug, Default)]
pub struct RunCache {
    payloads: HashMap<Platform, Vec<FetchedPayload>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, platform: Platform, payloads: Vec<FetchedPayload>) {
        self.payloads.entry(platform).or_default().extend(payloads);
    }

    pub fn get(&self, platform: Platform) -> &[FetchedPayload] {
        self.payloads
            .get(&platform)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetch every declared endpoint and turn the payloads into candidates.
    /// Failures stay inside the returned `sources`; this never errors as a whole.
    async fn scrape(&self, fetcher: &Fetcher, cache: &RunCache) -> AdapterOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_aliases_case_insensitively() {
        assert_eq!("Reddit".parse::<Platform>().unwrap(), Platform::Reddit);
        assert_eq!("blog".parse::<Platform>().unwrap(), Platform::Blogs);
        assert_eq!(" FORUM ".parse::<Platform>().unwrap(), Platform::Forums);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serde_uses_lowercase_names() {
        let v: Vec<Platform> = serde_json::from_str(r#"["rss","blog","news"]"#).unwrap();
        assert_eq!(v, vec![Platform::Rss, Platform::Blogs, Platform::News]);
        assert_eq!(serde_json::to_string(&Platform::Forums).unwrap(), r#""forums""#);
    }
}

// src/ingest/providers/rss.rs
//! RSS 2.0 feeds (`rss/channel/item`) with an Atom (`feed/entry`) fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tracing::warn;

use crate::error::ParseError;
use crate::ingest::fetch::Fetcher;
use crate::ingest::normalize_text;
use crate::ingest::providers::fetch_all;
use crate::ingest::types::{
    AdapterOutput, Candidate, FetchedPayload, Platform, PlatformAdapter, RawItem, RunCache,
    SourceOutcome,
};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
    summary: Option<Text>,
    content: Option<Text>,
    published: Option<String>,
    updated: Option<String>,
    author: Option<Person>,
}

#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Person {
    name: Option<String>,
}

/// HTML entities that are legal in feed bodies but not in XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn clean(s: Option<&str>) -> String {
    s.map(normalize_text).unwrap_or_default()
}

fn rss_candidates(platform: Platform, feed_url: &str, rss: Rss) -> Vec<Candidate> {
    rss.channel
        .items
        .into_iter()
        .filter_map(|it| {
            let title = clean(it.title.as_deref());
            let body = clean(it.description.as_deref());
            if title.is_empty() && body.is_empty() {
                return None;
            }
            Some(Candidate::new(RawItem {
                platform,
                source_url: it
                    .link
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| feed_url.to_string()),
                title,
                body,
                author: it
                    .creator
                    .or(it.author)
                    .map(|a| normalize_text(&a))
                    .filter(|a| !a.is_empty()),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
            }))
        })
        .collect()
}

fn atom_candidates(platform: Platform, feed_url: &str, feed: Feed) -> Vec<Candidate> {
    feed.entries
        .into_iter()
        .filter_map(|e| {
            let title = clean(e.title.as_ref().map(|t| t.value.as_str()));
            let body = clean(
                e.content
                    .as_ref()
                    .or(e.summary.as_ref())
                    .map(|t| t.value.as_str()),
            );
            if title.is_empty() && body.is_empty() {
                return None;
            }
            let link = e
                .links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or(e.links.first())
                .and_then(|l| l.href.clone());
            Some(Candidate::new(RawItem {
                platform,
                source_url: link.unwrap_or_else(|| feed_url.to_string()),
                title,
                body,
                author: e
                    .author
                    .and_then(|p| p.name)
                    .map(|n| normalize_text(&n))
                    .filter(|n| !n.is_empty()),
                published_at: e
                    .published
                    .or(e.updated)
                    .as_deref()
                    .and_then(parse_rfc3339),
            }))
        })
        .collect()
}

/// RSS first; Atom only when RSS fails to parse or has no items.
pub fn parse_feed(
    platform: Platform,
    feed_url: &str,
    xml: &str,
) -> Result<Vec<Candidate>, ParseError> {
    let xml = scrub_html_entities_for_xml(xml);
    let rss = from_str::<Rss>(&xml);
    let rss_err = match rss {
        Ok(rss) => {
            let items = rss_candidates(platform, feed_url, rss);
            if !items.is_empty() {
                return Ok(items);
            }
            None
        }
        Err(e) => Some(e.to_string()),
    };

    match from_str::<Feed>(&xml) {
        Ok(feed) => {
            let items = atom_candidates(platform, feed_url, feed);
            if items.is_empty() {
                if let Some(e) = rss_err {
                    return Err(ParseError::new(feed_url, format!("neither RSS nor Atom: {e}")));
                }
            }
            Ok(items)
        }
        Err(e) => Err(ParseError::new(
            feed_url,
            format!("neither RSS nor Atom: {}", rss_err.unwrap_or_else(|| e.to_string())),
        )),
    }
}

pub struct RssAdapter {
    feeds: Vec<String>,
    concurrency: usize,
}

impl RssAdapter {
    pub fn new(feeds: Vec<String>, concurrency: usize) -> Self {
        Self { feeds, concurrency }
    }
}

#[async_trait]
impl PlatformAdapter for RssAdapter {
    fn platform(&self) -> Platform {
        Platform::Rss
    }

    async fn scrape(&self, fetcher: &Fetcher, _cache: &RunCache) -> AdapterOutput {
        let mut out = AdapterOutput::default();
        let fetched = fetch_all(fetcher, Platform::Rss, self.feeds.clone(), self.concurrency).await;

        for (url, res) in fetched {
            let body = match res {
                Ok(body) => body,
                Err(e) => {
                    out.sources.push(SourceOutcome::failed(&url, &e));
                    continue;
                }
            };
            match parse_feed(Platform::Rss, &url, &body) {
                Ok(mut cands) => {
                    out.candidates.append(&mut cands);
                    out.sources.push(SourceOutcome::ok(&url));
                }
                Err(e) => {
                    warn!(
                        run_id = fetcher.run_id(),
                        platform = "rss",
                        url = %url,
                        error = %e,
                        "feed parse failed"
                    );
                    out.sources.push(SourceOutcome::failed(&url, &e));
                }
            }
            out.payloads.push(FetchedPayload { url, body });
        }
        out
    }
}

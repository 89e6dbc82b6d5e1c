// tests/providers.rs
mod common;

use common::{fixture, MockTransport, Reply};
use coffee_scout::config::HtmlSource;
use coffee_scout::ingest::circuit::CircuitBreaker;
use coffee_scout::ingest::fetch::{Fetcher, RetryPolicy};
use coffee_scout::ingest::providers::{blog, forum, html, news, reddit, rss};
use coffee_scout::ingest::types::{FetchedPayload, Platform, PlatformAdapter, RunCache};
use std::sync::Arc;

fn fetcher(transport: Arc<MockTransport>) -> Fetcher {
    Fetcher::new(
        "test-run",
        transport,
        Arc::new(CircuitBreaker::default()),
        RetryPolicy::immediate(),
        vec!["ua-test".into()],
    )
}

#[test]
fn reddit_listing_fixture() {
    let items = reddit::parse_listing(
        Platform::Reddit,
        "https://r.test/s.json",
        &fixture("reddit_listing.json"),
    )
    .unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].raw.author.as_deref(), Some("northloop_bean"));
    assert_eq!(items[0].signals.comments, 41.0);
    assert_eq!(items[1].raw.author, None, "[deleted] authors are dropped");
    assert!(items[1]
        .raw
        .source_url
        .starts_with("https://www.reddit.com/r/Minneapolis/comments/4d5e6f"));
}

#[test]
fn reddit_post_page_uses_array_fallback() {
    let items = reddit::parse_listing(
        Platform::Reddit,
        "https://r.test/p.json",
        &fixture("reddit_post.json"),
    )
    .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].raw.title, "Coffee crawl through Northeast Minneapolis");
    assert_eq!(items[0].signals.score, 230.0);
}

#[test]
fn news_selectors_fixture() {
    let src = HtmlSource::new("https://metro.test/food/");
    let items = html::extract(
        Platform::News,
        &src,
        ".byline, .author",
        &fixture("news_listing.html"),
    )
    .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].raw.title, "The 12 best coffee shops in Minneapolis");
    assert_eq!(
        items[0].raw.source_url,
        "https://metro.test/food/2025/03/minneapolis-coffee-shops"
    );
    assert_eq!(items[0].raw.author.as_deref(), Some("Dana Lee"));
    assert!(items[0].raw.published_at.is_some());
    assert_eq!(items[1].raw.source_url, "https://other.test/st-paul-cafe");
    assert_eq!(items[1].raw.author.as_deref(), Some("Chris Park"));
    assert!(items[1].raw.published_at.is_none());
}

#[test]
fn blog_readability_fixture() {
    let src = HtmlSource::new("https://roast.test/winter");
    let items =
        html::extract(Platform::Blogs, &src, ".author", &fixture("blog_post.html")).unwrap();
    assert_eq!(items.len(), 1);
    let raw = &items[0].raw;
    assert_eq!(raw.title, "Why Minnesota winters make great coffee weather");
    assert!(raw.body.starts_with("When the temperature drops"));
    assert!(raw.body.ends_with("cortado in Saint Paul."));
    assert!(!raw.body.contains("Subscribe"));
    assert!(!raw.body.contains("Comments are closed"));
    assert_eq!(raw.source_url, "https://roast.test/winter");
}

#[test]
fn rss_fixture() {
    let items =
        rss::parse_feed(Platform::Rss, "https://eats.test/rss", &fixture("feed_rss.xml")).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].raw.body,
        "The roaster's third cafe opens this spring with a full espresso menu."
    );
    assert_eq!(items[1].raw.title, "Brunch spots - our spring list");
    assert!(items.iter().all(|c| c.raw.published_at.is_some()));
}

#[test]
fn atom_fixture_via_fallback() {
    let items =
        rss::parse_feed(Platform::Rss, "https://atom.test/feed", &fixture("feed_atom.xml"))
            .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].raw.source_url, "https://atom.test/latte-art");
    assert_eq!(items[0].raw.author.as_deref(), Some("Staff"));
    assert_eq!(items[1].raw.source_url, "https://atom.test/prices");
    assert_eq!(items[1].raw.body, "Why your bag of beans costs more this year.");
}

#[tokio::test]
async fn html_adapters_report_per_source_outcomes() {
    let transport = Arc::new(
        MockTransport::new()
            .route("https://metro.test/food/", Reply::Ok(fixture("news_listing.html")))
            .route("https://metro.test/broken/", Reply::Status(500)),
    );
    let f = fetcher(transport.clone());
    let adapter = news::news_adapter(
        vec![
            HtmlSource::new("https://metro.test/food/"),
            HtmlSource::new("https://metro.test/broken/"),
        ],
        2,
    );
    let out = adapter.scrape(&f, &RunCache::new()).await;
    assert_eq!(out.candidates.len(), 2);
    assert_eq!(out.sources.len(), 2);
    assert!(out.sources[0].ok);
    assert!(!out.sources[1].ok);
    assert_eq!(transport.calls_to("https://metro.test/broken/"), 4);
    assert_eq!(out.payloads.len(), 1);
}

#[tokio::test]
async fn blog_adapter_parse_failure_counts_as_failed_source() {
    let transport = Arc::new(
        MockTransport::new().route("https://roast.test/empty", Reply::Ok("<p>hi</p>".into())),
    );
    let f = fetcher(transport);
    let adapter = blog::blog_adapter(vec![HtmlSource::new("https://roast.test/empty")], 1);
    let out = adapter.scrape(&f, &RunCache::new()).await;
    assert!(out.candidates.is_empty());
    assert_eq!(out.sources.len(), 1);
    assert!(!out.sources[0].ok);
    assert!(out.sources[0].error.as_deref().unwrap_or("").contains("readable"));
}

#[tokio::test]
async fn forum_reuses_cached_reddit_payloads_when_empty() {
    let transport = Arc::new(
        MockTransport::new().route(
            "https://forum.test/new.json",
            Reply::Ok(r#"{"data":{"children":[]}}"#.into()),
        ),
    );
    let f = fetcher(transport.clone());
    let mut cache = RunCache::new();
    cache.put(
        Platform::Reddit,
        vec![FetchedPayload {
            url: "https://r.test/s.json".into(),
            body: fixture("reddit_listing.json"),
        }],
    );

    let adapter = forum::ForumAdapter::new(vec!["https://forum.test/new.json".into()], 1);
    let out = adapter.scrape(&f, &cache).await;
    assert!(out.fallback_used);
    assert_eq!(out.candidates.len(), 3);
    assert!(out.candidates.iter().all(|c| c.raw.platform == Platform::Forums));
    assert_eq!(out.sources.len(), 1, "only the forum's own endpoints are sources");
    assert_eq!(transport.total_calls(), 1, "cached payloads are not refetched");
}

#[tokio::test]
async fn forum_uses_own_results_when_present() {
    let transport = Arc::new(
        MockTransport::new().route(
            "https://forum.test/new.json",
            Reply::Ok(fixture("reddit_post.json")),
        ),
    );
    let f = fetcher(transport);
    let mut cache = RunCache::new();
    cache.put(
        Platform::Reddit,
        vec![FetchedPayload {
            url: "https://r.test/s.json".into(),
            body: fixture("reddit_listing.json"),
        }],
    );
    let out = forum::ForumAdapter::new(vec!["https://forum.test/new.json".into()], 1)
        .scrape(&f, &cache)
        .await;
    assert!(!out.fallback_used);
    assert_eq!(out.candidates.len(), 1);
}

#[tokio::test]
async fn rss_adapter_keeps_declared_order() {
    let transport = Arc::new(
        MockTransport::new()
            .route("https://a.test/feed", Reply::Ok(fixture("feed_atom.xml")))
            .route("https://b.test/feed", Reply::Ok(fixture("feed_rss.xml"))),
    );
    let f = fetcher(transport);
    let out = rss::RssAdapter::new(
        vec!["https://a.test/feed".into(), "https://b.test/feed".into()],
        4,
    )
    .scrape(&f, &RunCache::new())
    .await;
    assert_eq!(out.candidates.len(), 4);
    assert_eq!(out.candidates[0].raw.source_url, "https://atom.test/latte-art");
    assert_eq!(out.candidates[2].raw.source_url, "https://eats.test/roaster-duluth");
    assert_eq!(out.sources.iter().filter(|s| s.ok).count(), 2);
}

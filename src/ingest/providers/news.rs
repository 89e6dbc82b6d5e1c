// src/ingest/providers/news.rs
use crate::config::HtmlSource;
use crate::ingest::providers::html::HtmlAdapter;
use crate::ingest::types::Platform;

/// Bylines on news listing pages.
const NEWS_AUTHOR_SELECTOR: &str = ".byline, .author, [rel=\"author\"]";

pub fn news_adapter(sources: Vec<HtmlSource>, concurrency: usize) -> HtmlAdapter {
    HtmlAdapter::new(Platform::News, sources, NEWS_AUTHOR_SELECTOR, concurrency)
}

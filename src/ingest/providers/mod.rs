// src/ingest/providers/mod.rs
pub mod blog;
pub mod forum;
pub mod html;
pub mod news;
pub mod reddit;
pub mod rss;

use futures::stream::{self, StreamExt};

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::ingest::fetch::Fetcher;
use crate::ingest::types::{Platform, PlatformAdapter};

/// Fetch every url with at most `concurrency` requests in flight.
/// Results come back in the order the urls were declared.
pub async fn fetch_all(
    fetcher: &Fetcher,
    platform: Platform,
    urls: Vec<String>,
    concurrency: usize,
) -> Vec<(String, Result<String, FetchError>)> {
    stream::iter(urls)
        .map(|url| async move {
            let res = fetcher.fetch(&url, platform).await;
            (url, res)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// The production adapter set for the configured sources, in run order.
pub fn default_adapters(cfg: &ScraperConfig) -> Vec<Box<dyn PlatformAdapter>> {
    let n = cfg.fetch.max_concurrency;
    let sources = &cfg.sources;
    Platform::ALL
        .iter()
        .map(|p| -> Box<dyn PlatformAdapter> {
            match p {
                Platform::Reddit => Box::new(reddit::RedditAdapter::new(sources.reddit.clone(), n)),
                Platform::News => Box::new(news::news_adapter(sources.news.clone(), n)),
                Platform::Blogs => Box::new(blog::blog_adapter(sources.blogs.clone(), n)),
                Platform::Rss => Box::new(rss::RssAdapter::new(sources.rss.clone(), n)),
                Platform::Forums => Box::new(forum::ForumAdapter::new(sources.forums.clone(), n)),
            }
        })
        .collect()
}

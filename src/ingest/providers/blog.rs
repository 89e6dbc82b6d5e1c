// src/ingest/providers/blog.rs
use crate::config::HtmlSource;
use crate::ingest::providers::html::HtmlAdapter;
use crate::ingest::types::Platform;

const BLOG_AUTHOR_SELECTOR: &str = ".author, .entry-author, .post-author, [rel=\"author\"]";

pub fn blog_adapter(sources: Vec<HtmlSource>, concurrency: usize) -> HtmlAdapter {
    HtmlAdapter::new(Platform::Blogs, sources, BLOG_AUTHOR_SELECTOR, concurrency)
}

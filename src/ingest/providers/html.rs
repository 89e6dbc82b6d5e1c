// src/ingest/providers/html.rs
//! Shared DOM extraction for news and blog pages: configured selectors first, then a
//! readability-style pass (densest paragraph block) when the selectors find nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::HtmlSource;
use crate::error::ParseError;
use crate::ingest::fetch::Fetcher;
use crate::ingest::normalize_text;
use crate::ingest::providers::fetch_all;
use crate::ingest::types::{
    AdapterOutput, Candidate, FetchedPayload, Platform, PlatformAdapter, RawItem, RunCache,
    SourceOutcome,
};

/// Readable text shorter than this is treated as page chrome, not an article.
const MIN_READABLE_CHARS: usize = 80;
const SKIP_ANCESTORS: &[&str] = &["nav", "header", "footer", "aside", "script", "style", "form"];

fn selector(source: &HtmlSource, css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css)
        .map_err(|e| ParseError::new(&source.url, format!("invalid selector `{css}`: {e:?}")))
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn resolve_url(base: &str, href: &str) -> String {
    match reqwest::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => href.to_string(),
    }
}

fn parse_date(el: ElementRef<'_>) -> Option<DateTime<Utc>> {
    let raw = el
        .value()
        .attr("datetime")
        .map(str::to_string)
        .unwrap_or_else(|| el.text().collect::<String>());
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Primary strategy: one candidate per `item_selector` match. Empty when nothing matches.
pub fn parse_with_selectors(
    platform: Platform,
    source: &HtmlSource,
    author_selector: &str,
    html: &str,
) -> Result<Vec<Candidate>, ParseError> {
    let doc = Html::parse_document(html);
    let item_sel = selector(source, &source.item_selector)?;
    let title_sel = selector(source, &source.title_selector)?;
    let body_sel = selector(source, &source.body_selector)?;
    let author_sel = selector(source, author_selector)?;
    let link_sel = source
        .link_selector
        .as_deref()
        .map(|css| selector(source, css))
        .transpose()?;
    let date_sel = source
        .date_selector
        .as_deref()
        .map(|css| selector(source, css))
        .transpose()?;

    let mut out = Vec::new();
    for item in doc.select(&item_sel) {
        let title = item
            .select(&title_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let body = item
            .select(&body_sel)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() && body.is_empty() {
            continue;
        }
        let source_url = link_sel
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_url(&source.url, href))
            .unwrap_or_else(|| source.url.clone());
        let author = item
            .select(&author_sel)
            .next()
            .map(element_text)
            .map(|a| a.trim_start_matches("By ").trim_start_matches("by ").to_string())
            .filter(|a| !a.is_empty());
        let published_at = date_sel
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .and_then(parse_date);

        out.push(Candidate::new(RawItem {
            platform,
            source_url,
            title,
            body,
            author,
            published_at,
        }));
    }
    Ok(out)
}

fn in_chrome(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|n| {
        n.value()
            .as_element()
            .is_some_and(|e| SKIP_ANCESTORS.contains(&e.name()))
    })
}

/// Fallback strategy: group paragraphs by parent, keep the parent with the most text.
pub fn readability_extract(
    platform: Platform,
    url: &str,
    html: &str,
) -> Result<Candidate, ParseError> {
    let doc = Html::parse_document(html);
    let p_sel = Selector::parse("p").expect("static selector");
    let title_sels = ["meta[property=\"og:title\"]", "h1", "title"];

    let mut order = Vec::new();
    let mut blocks: HashMap<_, Vec<String>> = HashMap::new();
    for p in doc.select(&p_sel) {
        if in_chrome(&p) {
            continue;
        }
        let text = element_text(p);
        if text.is_empty() {
            continue;
        }
        let Some(parent) = p.parent() else { continue };
        let entry = blocks.entry(parent.id()).or_insert_with(|| {
            order.push(parent.id());
            Vec::new()
        });
        entry.push(text);
    }

    let best = order
        .iter()
        .filter_map(|id| blocks.get(id))
        .max_by_key(|texts| texts.iter().map(|t| t.chars().count()).sum::<usize>());
    let body = best.map(|t| t.join(" ")).unwrap_or_default();
    if body.chars().count() < MIN_READABLE_CHARS {
        return Err(ParseError::new(url, "no readable content block"));
    }

    let title = title_sels
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| {
            doc.select(&sel).next().map(|el| match el.value().attr("content") {
                Some(content) => normalize_text(content),
                None => element_text(el),
            })
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| body.chars().take(80).collect());

    Ok(Candidate::new(RawItem {
        platform,
        source_url: url.to_string(),
        title,
        body,
        author: None,
        published_at: None,
    }))
}

/// Selectors first; readability only when they yield nothing.
pub fn extract(
    platform: Platform,
    source: &HtmlSource,
    author_selector: &str,
    html: &str,
) -> Result<Vec<Candidate>, ParseError> {
    let primary = parse_with_selectors(platform, source, author_selector, html);
    match primary {
        Ok(items) if !items.is_empty() => Ok(items),
        Ok(_) => readability_extract(platform, &source.url, html).map(|c| vec![c]),
        Err(e) => {
            info!(
                platform = %platform,
                url = %source.url,
                error = %e,
                "selectors unusable; trying readability"
            );
            readability_extract(platform, &source.url, html).map(|c| vec![c])
        }
    }
}

/// HTML page adapter; news and blogs differ only in sources and byline selector.
pub struct HtmlAdapter {
    platform: Platform,
    sources: Vec<HtmlSource>,
    author_selector: &'static str,
    concurrency: usize,
}

impl HtmlAdapter {
    pub fn new(
        platform: Platform,
        sources: Vec<HtmlSource>,
        author_selector: &'static str,
        concurrency: usize,
    ) -> Self {
        Self {
            platform,
            sources,
            author_selector,
            concurrency,
        }
    }
}

#[async_trait]
impl PlatformAdapter for HtmlAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn scrape(&self, fetcher: &Fetcher, _cache: &RunCache) -> AdapterOutput {
        let mut out = AdapterOutput::default();
        let urls = self.sources.iter().map(|s| s.url.clone()).collect();
        let fetched = fetch_all(fetcher, self.platform, urls, self.concurrency).await;

        for (source, (url, res)) in self.sources.iter().zip(fetched) {
            let body = match res {
                Ok(body) => body,
                Err(e) => {
                    out.sources.push(SourceOutcome::failed(&url, &e));
                    continue;
                }
            };
            match extract(self.platform, source, self.author_selector, &body) {
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
                        "html extraction failed"
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

    const LISTING_PAGE: &str = r#"<html><body>
      <nav><p>Home | Food | Drink</p></nav>
      <article>
        <h2><a href="/food/coffee-guide">A guide to Minneapolis coffee</a></h2>
        <span class="byline">By Ana Ruiz</span>
        <time datetime="2025-03-01T12:00:00Z">March 1</time>
        <p>Roasters in Northeast keep opening.</p>
        <p>Here is where to go.</p>
      </article>
      <article><h2>Empty teaser</h2></article>
    </body></html>"#;

    #[test]
    fn selectors_extract_items() {
        let src = HtmlSource::new("https://news.test/food/");
        let items = parse_with_selectors(Platform::News, &src, ".byline", LISTING_PAGE).unwrap();
        assert_eq!(items.len(), 2);
        let first = &items[0].raw;
        assert_eq!(first.title, "A guide to Minneapolis coffee");
        assert_eq!(first.body, "Roasters in Northeast keep opening. Here is where to go.");
        assert_eq!(first.source_url, "https://news.test/food/coffee-guide");
        assert_eq!(first.author.as_deref(), Some("Ana Ruiz"));
        assert!(first.published_at.is_some());
        assert_eq!(items[1].raw.title, "Empty teaser");
        assert_eq!(items[1].raw.source_url, "https://news.test/food/");
    }

    #[test]
    fn readability_picks_densest_block() {
        let html = r#"<html><head><title>Cafe opens in St. Paul</title></head><body>
          <footer><p>Copyright and a very long footer paragraph that should never be chosen as content because it is chrome.</p></footer>
          <div class="sidebar"><p>Short.</p></div>
          <div class="story">
            <p>A new cafe opened on Grand Avenue this week, serving pour over and espresso.</p>
            <p>The owners roast in small batches and plan a second shop in Minneapolis.</p>
          </div>
        </body></html>"#;
        let c = readability_extract(Platform::Blogs, "https://blog.test/post", html).unwrap();
        assert_eq!(c.raw.title, "Cafe opens in St. Paul");
        assert!(c.raw.body.starts_with("A new cafe opened"));
        assert!(c.raw.body.contains("second shop"));
        assert!(!c.raw.body.contains("Copyright"));
    }

    #[test]
    fn extract_falls_back_when_selectors_match_nothing() {
        let html = r#"<html><body><h1>Cold brew season</h1><main>
          <p>Every shop in the Twin Cities now has a cold brew on tap, and some have three or four of them.</p>
        </main></body></html>"#;
        let src = HtmlSource::new("https://blog.test/").selectors(".post", "h2", "p");
        let items = extract(Platform::Blogs, &src, ".author", html).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].raw.title, "Cold brew season");
    }

    #[test]
    fn thin_pages_are_parse_errors() {
        let err =
            readability_extract(Platform::News, "https://n.test/", "<p>tiny</p>").unwrap_err();
        assert!(err.reason.contains("readable"));
    }
}

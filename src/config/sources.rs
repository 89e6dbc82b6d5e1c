// src/config/sources.rs
//! Built-in endpoint catalog per platform. Any list can be replaced from the config file.

use serde::{Deserialize, Serialize};

/// One HTML page plus the selectors that find items on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HtmlSource {
    pub url: String,
    #[serde(default = "default_item_selector")]
    pub item_selector: String,
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    #[serde(default = "default_body_selector")]
    pub body_selector: String,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub date_selector: Option<String>,
}

fn default_item_selector() -> String {
    "article".to_string()
}
fn default_title_selector() -> String {
    "h1, h2, h3".to_string()
}
fn default_body_selector() -> String {
    "p".to_string()
}

impl HtmlSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            item_selector: default_item_selector(),
            title_selector: default_title_selector(),
            body_selector: default_body_selector(),
            link_selector: Some("a[href]".to_string()),
            date_selector: Some("time".to_string()),
        }
    }

    pub fn selectors(mut self, item: &str, title: &str, body: &str) -> Self {
        self.item_selector = item.to_string();
        self.title_selector = title.to_string();
        self.body_selector = body.to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceCatalog {
    pub reddit: Vec<String>,
    pub forums: Vec<String>,
    pub rss: Vec<String>,
    pub news: Vec<HtmlSource>,
    pub blogs: Vec<HtmlSource>,
}

fn reddit_search(sub: &str, query: &str) -> String {
    format!("https://www.reddit.com/r/{sub}/search.json?q={query}&restrict_sr=1&sort=new&limit=50")
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self {
            reddit: vec![
                reddit_search("Minneapolis", "coffee"),
                reddit_search("TwinCities", "coffee"),
                reddit_search("minnesota", "coffee"),
                reddit_search("saintpaul", "coffee"),
            ],
            forums: vec![
                reddit_search("Coffee", "minneapolis"),
                reddit_search("espresso", "minnesota"),
            ],
            rss: vec![
                "https://twincities.eater.com/rss/index.xml".to_string(),
                "https://sprudge.com/feed".to_string(),
            ],
            news: vec![
                HtmlSource::new("https://www.startribune.com/food-drink/"),
                HtmlSource::new("https://www.minnpost.com/food/"),
            ],
            blogs: vec![
                HtmlSource::new("https://heavytable.com/").selectors(
                    "article.post, article",
                    "h2.entry-title, h2, h1",
                    ".entry-content p, .entry-summary p, p",
                ),
                HtmlSource::new("https://www.mspmag.com/eat-and-drink/").selectors(
                    "article, .story",
                    "h2, h3",
                    "p",
                ),
            ],
        }
    }
}

// src/analyze/mod.rs
//! Run-level aggregation: platform stats, trending topics, confidence and insights.
//! Everything here is order-independent over the accepted items.

pub mod stats;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ingest::types::{Platform, ScoredItem};

pub use stats::{percentile, PlatformRunStats};

pub const TOP_PLATFORMS: usize = 3;
pub const TRENDING_TOPICS: usize = 10;
const MIN_TOPIC_LETTERS: usize = 4;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Alphabetic}+").unwrap());

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "that", "this", "with", "from", "have", "your", "what", "when", "where", "which", "will",
        "about", "their", "there", "they", "them", "then", "than", "been", "were", "into", "just",
        "like", "more", "some", "also", "only", "over", "does", "here", "best", "anyone", "know",
        "looking", "would", "could", "should", "after", "before", "these", "those", "other",
    ]
    .into_iter()
    .collect()
});

/// One row of the append-only trend audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    pub run_id: String,
    pub analysis_date: DateTime<Utc>,
    pub total_platforms: usize,
    pub total_content: usize,
    pub top_platforms: Vec<Platform>,
    pub trending_topics: Vec<String>,
    pub confidence_score: f64,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub run_id: String,
    pub analysis_date: DateTime<Utc>,
    pub platforms: Vec<PlatformRunStats>,
    pub total_content: usize,
    pub top_platforms: Vec<Platform>,
    pub trending_topics: Vec<String>,
    pub confidence_score: f64,
    /// Mean per-platform success rate; `None` when no platform was attempted.
    pub avg_success_rate: Option<f64>,
    pub insights: Vec<String>,
}

impl Analysis {
    pub fn snapshot(&self) -> TrendSnapshot {
        TrendSnapshot {
            run_id: self.run_id.clone(),
            analysis_date: self.analysis_date,
            total_platforms: self.platforms.len(),
            total_content: self.total_content,
            top_platforms: self.top_platforms.clone(),
            trending_topics: self.trending_topics.clone(),
            confidence_score: self.confidence_score,
            insights: self.insights.clone(),
        }
    }
}

pub fn analyze(
    run_id: &str,
    analysis_date: DateTime<Utc>,
    platforms: Vec<PlatformRunStats>,
    items: &[ScoredItem],
) -> Analysis {
    let total_content = items.len();
    let avg_relevance = if items.is_empty() {
        0.0
    } else {
        items.iter().map(|i| i.relevance_score).sum::<f64>() / total_content as f64
    };
    let platforms_with_items = items.iter().map(|i| i.raw.platform).collect::<HashSet<_>>().len();
    let avg_success_rate = if platforms.is_empty() {
        None
    } else {
        Some(platforms.iter().map(|p| p.success_rate).sum::<f64>() / platforms.len() as f64)
    };

    let top_platforms = top_platforms(items);
    let trending_topics = trending_topics(items.iter().map(|i| i.raw.title.as_str()));
    let insights = insights(&platforms, &top_platforms, total_content);

    Analysis {
        run_id: run_id.to_string(),
        analysis_date,
        platforms,
        total_content,
        top_platforms,
        trending_topics,
        confidence_score: confidence_score(total_content, platforms_with_items, avg_relevance),
        avg_success_rate,
        insights,
    }
}

/// `0.4·min(total/100,1) + 0.3·min(platforms/5,1) + 0.3·avg_relevance`, in [0,1].
pub fn confidence_score(total: usize, platforms_with_items: usize, avg_relevance: f64) -> f64 {
    let volume = (total as f64 / 100.0).min(1.0);
    let spread = (platforms_with_items as f64 / 5.0).min(1.0);
    (0.4 * volume + 0.3 * spread + 0.3 * avg_relevance).clamp(0.0, 1.0)
}

/// Top platforms by item count (ties by name); platforms with no items never appear.
pub fn top_platforms(items: &[ScoredItem]) -> Vec<Platform> {
    let mut counts: BTreeMap<&'static str, (Platform, usize)> = BTreeMap::new();
    for item in items {
        counts
            .entry(item.raw.platform.as_str())
            .or_insert((item.raw.platform, 0))
            .1 += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|(an, (_, ac)), (bn, (_, bc))| bc.cmp(ac).then(an.cmp(bn)));
    ranked
        .into_iter()
        .take(TOP_PLATFORMS)
        .map(|(_, (p, _))| p)
        .collect()
}

/// Most frequent lowercase words of 4+ letters across titles, minus stopwords.
/// Ties are broken alphabetically.
pub fn trending_topics<'a>(titles: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for title in titles {
        let lower = title.to_lowercase();
        for m in WORD_RE.find_iter(&lower) {
            let w = m.as_str();
            if w.chars().count() >= MIN_TOPIC_LETTERS && !STOPWORDS.contains(w) {
                *freq.entry(w.to_string()).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|(aw, ac), (bw, bc)| bc.cmp(ac).then_with(|| aw.cmp(bw)));
    ranked
        .into_iter()
        .take(TRENDING_TOPICS)
        .map(|(w, _)| w)
        .collect()
}

fn insights(stats: &[PlatformRunStats], top: &[Platform], total: usize) -> Vec<String> {
    let mut out = Vec::new();
    if total == 0 {
        out.push("No relevant content was collected this run.".to_string());
    }
    if let Some(lead) = top.first().and_then(|p| stats.iter().find(|s| s.platform == *p)) {
        out.push(format!(
            "{} led with {} items (avg relevance {:.2}).",
            lead.platform, lead.content_count, lead.avg_relevance
        ));
    }
    for s in stats {
        if s.source_count > 0 && s.failure_count == s.source_count {
            out.push(format!(
                "{} failed on all {} sources.",
                s.platform, s.source_count
            ));
        } else if s.failure_count > 0 {
            out.push(format!(
                "{} had {} of {} sources fail (success rate {:.0}%).",
                s.platform,
                s.failure_count,
                s.source_count,
                s.success_rate * 100.0
            ));
        }
        if s.fallback_used {
            out.push(format!(
                "{} reused payloads already fetched this run.",
                s.platform
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetch::PlatformTelemetry;
    use crate::ingest::types::{RawItem, SourceOutcome};

    fn item(platform: Platform, title: &str, relevance: f64) -> ScoredItem {
        ScoredItem {
            raw: RawItem {
                platform,
                source_url: "https://t.test".into(),
                title: title.into(),
                body: String::new(),
                author: None,
                published_at: None,
            },
            relevance_score: relevance,
            engagement_score: 0.0,
            content_hash: title.into(),
            simhash: 0,
            token_count: 0,
            truncated: false,
            minnesota_mentions: 0,
            coffee_mentions: 0,
        }
    }

    #[test]
    fn confidence_formula() {
        assert_eq!(confidence_score(0, 0, 0.0), 0.0);
        let c = confidence_score(50, 2, 0.5);
        assert!((c - (0.2 + 0.12 + 0.15)).abs() < 1e-12);
        assert_eq!(confidence_score(1000, 9, 1.0), 1.0);
    }

    #[test]
    fn top_platforms_by_count_then_name() {
        let items = vec![
            item(Platform::Rss, "a", 0.1),
            item(Platform::News, "b", 0.1),
            item(Platform::Blogs, "c", 0.1),
            item(Platform::Rss, "d", 0.1),
            item(Platform::Reddit, "e", 0.1),
        ];
        assert_eq!(
            top_platforms(&items),
            vec![Platform::Rss, Platform::Blogs, Platform::News]
        );
    }

    #[test]
    fn trending_topics_skip_short_and_stopwords() {
        let topics = trending_topics([
            "Best coffee in Minneapolis",
            "Coffee roasters with latte art",
            "Latte or coffee? Ask the roasters",
        ]);
        assert_eq!(topics[0], "coffee");
        assert_eq!(&topics[1..3], &["latte", "roasters"]);
        assert!(!topics.contains(&"best".to_string()));
        assert!(!topics.contains(&"with".to_string()));
        assert!(!topics.iter().any(|t| t.len() < 4));
    }

    #[test]
    fn analysis_aggregates_and_snapshots() {
        let stats = vec![
            PlatformRunStats::build(
                Platform::Reddit,
                &[SourceOutcome::ok("u")],
                &[],
                &PlatformTelemetry::default(),
                false,
            ),
            PlatformRunStats::build(
                Platform::News,
                &[SourceOutcome::failed("u", "boom")],
                &[],
                &PlatformTelemetry::default(),
                false,
            ),
        ];
        let items = vec![item(Platform::Reddit, "Espresso tonic", 0.4)];
        let a = analyze("run-1", Utc::now(), stats, &items);
        assert_eq!(a.avg_success_rate, Some(0.5));
        assert_eq!(a.top_platforms, vec![Platform::Reddit]);
        assert!(a.insights.iter().any(|i| i.contains("news failed on all 1 sources")));
        let snap = a.snapshot();
        assert_eq!(snap.total_platforms, 2);
        assert_eq!(snap.total_content, 1);
        assert_eq!(snap.run_id, "run-1");
    }

    #[test]
    fn empty_run_has_zero_confidence() {
        let a = analyze("r", Utc::now(), Vec::new(), &[]);
        assert_eq!(a.confidence_score, 0.0);
        assert_eq!(a.avg_success_rate, None);
        assert!(a.top_platforms.is_empty());
    }
}

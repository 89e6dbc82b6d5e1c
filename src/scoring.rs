// src/scoring.rs
//! Relevance (keyword-weighted) and engagement (normalized source-native signals) scores.
//! Both are always in [0,1].

use regex::Regex;

use crate::ingest::types::EngagementSignals;

/// Keyword mentions found in `title + body`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mentions {
    pub minnesota: usize,
    pub coffee: usize,
}

/// Compiled keyword sets. Set A (Minnesota) weighs 2x, set B (coffee) 1x.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    minnesota: Option<Regex>,
    coffee: Option<Regex>,
}

fn compile_set(keywords: &[String]) -> anyhow::Result<Option<Regex>> {
    let alts: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alts.is_empty() {
        return Ok(None);
    }
    let pattern = format!("(?i)(?:{})", alts.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("keyword regex error: {e}"))
}

impl KeywordScorer {
    pub fn new(minnesota: &[String], coffee: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            minnesota: compile_set(minnesota)?,
            coffee: compile_set(coffee)?,
        })
    }

    /// Case-insensitive, non-overlapping occurrence counts over `title + " " + body`.
    pub fn mentions(&self, title: &str, body: &str) -> Mentions {
        let text = join_text(title, body);
        let count = |re: &Option<Regex>| re.as_ref().map_or(0, |r| r.find_iter(&text).count());
        Mentions {
            minnesota: count(&self.minnesota),
            coffee: count(&self.coffee),
        }
    }

    pub fn relevance(&self, title: &str, body: &str) -> f64 {
        let m = self.mentions(title, body);
        relevance_from(m, join_text(title, body).chars().count())
    }
}

fn join_text(title: &str, body: &str) -> String {
    format!("{title} {body}")
}

/// `(2·A + B + min(chars/1000, 0.5)) / 10`, clamped to [0,1].
pub fn relevance_from(m: Mentions, text_chars: usize) -> f64 {
    let length_bonus = (text_chars as f64 / 1000.0).min(0.5);
    let raw = (2.0 * m.minnesota as f64 + m.coffee as f64 + length_bonus) / 10.0;
    clamp01(raw)
}

/// `(min(score/100,1)·0.6 + min(comments/50,1)·0.4) · ratio`, clamped to [0,1].
pub fn engagement(signals: EngagementSignals) -> f64 {
    let score = (nonneg(signals.score) / 100.0).min(1.0);
    let comments = (nonneg(signals.comments) / 50.0).min(1.0);
    let ratio = if signals.ratio.is_finite() {
        signals.ratio
    } else {
        1.0
    };
    clamp01((score * 0.6 + comments * 0.4) * ratio)
}

fn nonneg(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn clamp01(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> KeywordScorer {
        KeywordScorer::new(
            &["minneapolis".to_string(), "twin cities".to_string()],
            &["coffee".to_string(), "espresso".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn counts_mentions_case_insensitively() {
        let m = scorer().mentions("Minneapolis coffee", "Best COFFEE in the Twin Cities");
        assert_eq!(m, Mentions { minnesota: 2, coffee: 2 });
    }

    #[test]
    fn relevance_matches_formula() {
        // "a b": 3 chars -> bonus 0.003; no mentions.
        let r = scorer().relevance("a", "b");
        assert!((r - 0.0003).abs() < 1e-12);

        // 1 A + 1 B, 18 chars -> (2 + 1 + 0.018) / 10
        let r = scorer().relevance("Minneapolis", "coffee");
        assert!((r - 0.3018).abs() < 1e-9, "got {r}");
    }

    #[test]
    fn relevance_clamps_at_one() {
        let body = "minneapolis ".repeat(20);
        assert_eq!(scorer().relevance("", &body), 1.0);
    }

    #[test]
    fn engagement_matches_formula_and_defaults() {
        let e = engagement(EngagementSignals {
            score: 50.0,
            comments: 25.0,
            ratio: 0.5,
        });
        assert!((e - 0.25).abs() < 1e-12);
        assert_eq!(engagement(EngagementSignals::default()), 0.0);
        assert_eq!(
            engagement(EngagementSignals {
                score: 1e9,
                comments: 1e9,
                ratio: 1.0
            }),
            1.0
        );
    }

    #[test]
    fn empty_keyword_sets_score_only_length() {
        let s = KeywordScorer::new(&[], &[]).unwrap();
        assert_eq!(s.mentions("coffee", "minneapolis"), Mentions::default());
    }
}

// src/ingest/mod.rs
pub mod circuit;
pub mod fetch;
pub mod providers;
pub mod types;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::fingerprint::{content_hash, simhash, tokenize, DedupIndex};
use crate::ingest::types::{Candidate, ScoredItem};
use crate::scoring::{engagement, relevance_from, KeywordScorer};

/// One-time metrics registration (so series show up once a recorder is installed).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_candidates_total",
            "Candidates produced by platform adapters."
        );
        describe_counter!("ingest_kept_total", "Items kept after scoring and dedup.");
        describe_counter!(
            "ingest_below_threshold_total",
            "Candidates dropped below the relevance threshold."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Candidates dropped as exact or near duplicates."
        );
        describe_counter!(
            "fetch_failures_total",
            "Fetches that failed after retries."
        );
    });
}

/// Normalize text: strip tags, decode entities, fold curly quotes, collapse whitespace.
///
/// Tags are stripped before decoding so escaped angle brackets in plain text
/// (`&lt;3`) survive as text instead of being mistaken for markup.
pub fn normalize_text(s: &str) -> String {
    // 1) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(s, " ");

    // 2) HTML entity decode
    let mut out = html_escape::decode_html_entities(&stripped).to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cut `body` to at most `max_chars` characters.
/// Returns (stored body, token count of the stored body, truncated?).
pub fn truncate_body(body: &str, max_chars: usize) -> (String, usize, bool) {
    let truncated = body.chars().count() > max_chars;
    let kept: String = if truncated {
        body.chars().take(max_chars).collect::<String>().trim_end().to_string()
    } else {
        body.to_string()
    };
    let tokens = tokenize(&kept).len();
    (kept, tokens, truncated)
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub threshold: f64,
    pub max_body_chars: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounts {
    pub candidates: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
    pub capped: usize,
    pub kept: usize,
}

/// Shared steps for every adapter's candidates, in adapter-yield order:
/// relevance threshold, exact/near dedup, body truncation, engagement, result cap.
///
/// Only candidates that pass the threshold touch the dedup index. Once the cap is hit the
/// rest are counted as capped without being fingerprinted.
pub fn process_candidates(
    candidates: Vec<Candidate>,
    scorer: &KeywordScorer,
    dedup: &mut DedupIndex,
    settings: &PipelineSettings,
) -> (Vec<ScoredItem>, PipelineCounts) {
    ensure_metrics_described();

    let mut counts = PipelineCounts {
        candidates: candidates.len(),
        ..Default::default()
    };
    let mut kept = Vec::new();

    for (i, cand) in candidates.into_iter().enumerate() {
        if settings.limit.is_some_and(|cap| kept.len() >= cap) {
            counts.capped = counts.candidates - i;
            break;
        }

        let raw = cand.raw;
        let mentions = scorer.mentions(&raw.title, &raw.body);
        let full_text = format!("{} {}", raw.title, raw.body);
        let relevance = relevance_from(mentions, full_text.chars().count());
        if relevance < settings.threshold {
            counts.below_threshold += 1;
            continue;
        }

        let hash = content_hash(&raw.title, &raw.body);
        let fp = simhash(&full_text);
        if dedup.is_duplicate(&hash, fp) {
            counts.duplicates += 1;
            continue;
        }

        let (body, token_count, truncated) = truncate_body(&raw.body, settings.max_body_chars);
        kept.push(ScoredItem {
            raw: types::RawItem { body, ..raw },
            relevance_score: relevance,
            engagement_score: engagement(cand.signals),
            content_hash: hash,
            simhash: fp,
            token_count,
            truncated,
            minnesota_mentions: mentions.minnesota,
            coffee_mentions: mentions.coffee,
        });
    }
    counts.kept = kept.len();

    counter!("ingest_candidates_total").increment(counts.candidates as u64);
    counter!("ingest_kept_total").increment(counts.kept as u64);
    counter!("ingest_below_threshold_total").increment(counts.below_threshold as u64);
    counter!("ingest_dedup_total").increment(counts.duplicates as u64);

    (kept, counts)
}

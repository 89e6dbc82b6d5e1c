// src/report.rs
//! Markdown and HTML renderings of one run's analysis, plus the optional JSON dump.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analyze::Analysis;
use crate::ingest::types::ScoredItem;

/// Items listed under "Top items", by relevance.
const TOP_ITEMS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub html: PathBuf,
}

/// `report-<UTC timestamp>-<run id prefix>`; the run id keeps same-second runs apart.
pub fn report_stem(analysis: &Analysis) -> String {
    let run: String = analysis
        .run_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(8)
        .collect();
    format!(
        "report-{}-{}",
        analysis.analysis_date.format("%Y%m%dT%H%M%SZ"),
        run
    )
}

/// Percent-encode the characters that end or split a Markdown link destination.
fn markdown_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            ' ' => out.push_str("%20"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            _ => out.push(c),
        }
    }
    out
}

fn top_items(items: &[ScoredItem]) -> Vec<&ScoredItem> {
    let mut v: Vec<&ScoredItem> = items.iter().collect();
    v.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    v.truncate(TOP_ITEMS);
    v
}

fn pct(v: f64) -> String {
    format!("{:.0}%", v * 100.0)
}

pub fn render_markdown(analysis: &Analysis, items: &[ScoredItem]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Coffee Scout report\n");
    let _ = writeln!(
        md,
        "Run `{}` at {}\n",
        analysis.run_id,
        analysis.analysis_date.to_rfc3339()
    );

    let _ = writeln!(md, "## Summary\n");
    let _ = writeln!(md, "- Items: {}", analysis.total_content);
    let _ = writeln!(md, "- Platforms attempted: {}", analysis.platforms.len());
    let _ = writeln!(md, "- Confidence: {:.3}", analysis.confidence_score);
    if let Some(rate) = analysis.avg_success_rate {
        let _ = writeln!(md, "- Mean success rate: {}", pct(rate));
    }
    md.push('\n');

    let _ = writeln!(md, "## Platforms\n");
    let _ = writeln!(
        md,
        "| Platform | Items | Avg relevance | Success | Failures | Retries | p50 ms | p90 ms | p99 ms |"
    );
    let _ = writeln!(md, "|---|---:|---:|---:|---:|---:|---:|---:|---:|");
    for s in &analysis.platforms {
        let _ = writeln!(
            md,
            "| {}{} | {} | {:.3} | {} | {} | {} | {:.0} | {:.0} | {:.0} |",
            s.platform,
            if s.fallback_used { " (fallback)" } else { "" },
            s.content_count,
            s.avg_relevance,
            pct(s.success_rate),
            s.failure_count,
            s.retry_count,
            s.latency_p50_ms,
            s.latency_p90_ms,
            s.latency_p99_ms
        );
    }
    md.push('\n');

    let top: Vec<String> = analysis.top_platforms.iter().map(|p| p.to_string()).collect();
    let _ = writeln!(md, "## Top platforms\n\n{}\n", or_none(&top.join(", ")));
    let _ = writeln!(
        md,
        "## Trending topics\n\n{}\n",
        or_none(&analysis.trending_topics.join(", "))
    );

    let _ = writeln!(md, "## Insights\n");
    for line in &analysis.insights {
        let _ = writeln!(md, "- {line}");
    }
    md.push('\n');

    let _ = writeln!(md, "## Top items\n");
    for item in top_items(items) {
        let _ = writeln!(
            md,
            "- [{}]({}) ({}, relevance {:.3})",
            item.raw.title.replace(['[', ']'], ""),
            markdown_url(&item.raw.source_url),
            item.raw.platform,
            item.relevance_score
        );
    }
    md
}

fn or_none(s: &str) -> &str {
    if s.is_empty() {
        "none"
    } else {
        s
    }
}

pub fn render_html(analysis: &Analysis, items: &[ScoredItem]) -> String {
    use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

    let mut h = String::new();
    h.push_str("<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">");
    let _ = write!(h, "<title>Coffee Scout report {}</title>", text(&analysis.run_id));
    h.push_str("</head><body>\n<h1>Coffee Scout report</h1>\n");
    let _ = writeln!(
        h,
        "<p>Run <code>{}</code> at {}</p>",
        text(&analysis.run_id),
        analysis.analysis_date.to_rfc3339()
    );

    h.push_str("<h2>Summary</h2><ul>");
    let _ = write!(h, "<li>Items: {}</li>", analysis.total_content);
    let _ = write!(h, "<li>Platforms attempted: {}</li>", analysis.platforms.len());
    let _ = write!(h, "<li>Confidence: {:.3}</li>", analysis.confidence_score);
    if let Some(rate) = analysis.avg_success_rate {
        let _ = write!(h, "<li>Mean success rate: {}</li>", pct(rate));
    }
    h.push_str("</ul>\n");

    h.push_str(concat!(
        "<h2>Platforms</h2>\n<table><tr><th>Platform</th><th>Items</th>",
        "<th>Avg relevance</th><th>Success</th><th>Failures</th><th>Retries</th>",
        "<th>p50 ms</th><th>p90 ms</th><th>p99 ms</th></tr>\n"
    ));
    for s in &analysis.platforms {
        let _ = writeln!(
            h,
            "<tr><td>{}{}</td><td>{}</td><td>{:.3}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.0}</td><td>{:.0}</td><td>{:.0}</td></tr>",
            s.platform,
            if s.fallback_used { " (fallback)" } else { "" },
            s.content_count,
            s.avg_relevance,
            pct(s.success_rate),
            s.failure_count,
            s.retry_count,
            s.latency_p50_ms,
            s.latency_p90_ms,
            s.latency_p99_ms
        );
    }
    h.push_str("</table>\n");

    let top: Vec<String> = analysis.top_platforms.iter().map(|p| p.to_string()).collect();
    let _ = writeln!(h, "<h2>Top platforms</h2><p>{}</p>", or_none(&top.join(", ")));
    let _ = writeln!(
        h,
        "<h2>Trending topics</h2><p>{}</p>",
        text(or_none(&analysis.trending_topics.join(", ")))
    );

    h.push_str("<h2>Insights</h2><ul>");
    for line in &analysis.insights {
        let _ = write!(h, "<li>{}</li>", text(line));
    }
    h.push_str("</ul>\n<h2>Top items</h2><ol>");
    for item in top_items(items) {
        let _ = write!(
            h,
            "<li><a href=\"{}\">{}</a> ({}, relevance {:.3})</li>",
            attr(&item.raw.source_url),
            text(&item.raw.title),
            item.raw.platform,
            item.relevance_score
        );
    }
    h.push_str("</ol>\n</body></html>\n");
    h
}

/// Write `<stem>.md` and `.html` under `dir`, creating it if needed.
pub fn write_reports(dir: &Path, analysis: &Analysis, items: &[ScoredItem]) -> Result<ReportPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating report dir {}", dir.display()))?;
    let stem = report_stem(analysis);
    let paths = ReportPaths {
        markdown: dir.join(format!("{stem}.md")),
        html: dir.join(format!("{stem}.html")),
    };
    std::fs::write(&paths.markdown, render_markdown(analysis, items))
        .with_context(|| format!("writing {}", paths.markdown.display()))?;
    std::fs::write(&paths.html, render_html(analysis, items))
        .with_context(|| format!("writing {}", paths.html.display()))?;

    info!(
        event = "report_written",
        run_id = %analysis.run_id,
        markdown = %paths.markdown.display(),
        html = %paths.html.display(),
        "reports written"
    );
    Ok(paths)
}

#[derive(Serialize)]
struct JsonDump<'a> {
    analysis: &'a Analysis,
    results: &'a [ScoredItem],
}

pub fn write_json(path: &Path, analysis: &Analysis, items: &[ScoredItem]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output dir {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(&JsonDump {
        analysis,
        results: items,
    })?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    info!(
        event = "json_written",
        run_id = %analysis.run_id,
        path = %path.display(),
        items = items.len(),
        "json dump written"
    );
    Ok(())
}

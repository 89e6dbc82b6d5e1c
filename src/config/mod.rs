// src/config/mod.rs
//! Run configuration. Loaded once from JSON (or TOML by extension), validated, then
//! adjusted by CLI overrides. Missing file means built-in defaults.

pub mod sources;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::Platform;
pub use sources::{HtmlSource, SourceCatalog};

pub const DEFAULT_CONFIG_PATH: &str = "config/scraper.json";
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.05;
pub const DEFAULT_ALERT_SUCCESS_RATE_THRESHOLD: f64 = 0.6;
pub const DEFAULT_MAX_BODY_CHARS: usize = 5000;

const DEFAULT_MINNESOTA_KEYWORDS: &[&str] = &[
    "minnesota",
    "minneapolis",
    "st. paul",
    "saint paul",
    "twin cities",
    "duluth",
    "rochester",
    "bloomington",
    "northeast mpls",
];

const DEFAULT_COFFEE_KEYWORDS: &[&str] = &[
    "coffee",
    "espresso",
    "cafe",
    "roaster",
    "latte",
    "cold brew",
    "barista",
    "pour over",
];

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "coffee-scout/0.1 (+https://example.invalid/coffee-scout)",
];

fn default_relevance_threshold() -> f64 {
    DEFAULT_RELEVANCE_THRESHOLD
}

/// `{"default": 0.05, "reddit": 0.1, ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelevanceThresholds {
    #[serde(default = "default_relevance_threshold")]
    pub default: f64,
    #[serde(flatten)]
    pub per_platform: BTreeMap<String, f64>,
}

impl Default for RelevanceThresholds {
    fn default() -> Self {
        Self {
            default: DEFAULT_RELEVANCE_THRESHOLD,
            per_platform: BTreeMap::new(),
        }
    }
}

impl RelevanceThresholds {
    pub fn for_platform(&self, platform: Platform) -> f64 {
        self.per_platform
            .get(platform.as_str())
            .copied()
            .unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub rate_limit_extra_ms: u64,
    pub max_concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
            rate_limit_extra_ms: 1_000,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitSettings {
    pub threshold: u32,
    pub reset_after_secs: i64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_after_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScraperConfig {
    pub minnesota_keywords: Vec<String>,
    pub coffee_keywords: Vec<String>,
    pub relevance_thresholds: RelevanceThresholds,
    pub include_platforms: Option<Vec<Platform>>,
    pub exclude_platforms: Option<Vec<Platform>>,
    pub per_platform_limit: Option<usize>,
    pub proxy: Option<String>,
    pub user_agents: Option<Vec<String>>,
    pub dry_run: bool,
    pub output_json: Option<PathBuf>,
    pub report_dir: PathBuf,
    pub alert_webhook: Option<String>,
    pub alert_success_rate_threshold: f64,
    pub db_path: PathBuf,
    pub max_body_chars: usize,
    pub fetch: FetchSettings,
    pub circuit: CircuitSettings,
    pub sources: SourceCatalog,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            minnesota_keywords: owned(DEFAULT_MINNESOTA_KEYWORDS),
            coffee_keywords: owned(DEFAULT_COFFEE_KEYWORDS),
            relevance_thresholds: RelevanceThresholds::default(),
            include_platforms: None,
            exclude_platforms: None,
            per_platform_limit: None,
            proxy: None,
            user_agents: None,
            dry_run: false,
            output_json: None,
            report_dir: PathBuf::from("reports"),
            alert_webhook: None,
            alert_success_rate_threshold: DEFAULT_ALERT_SUCCESS_RATE_THRESHOLD,
            db_path: PathBuf::from("data/coffee_scout.db"),
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            fetch: FetchSettings::default(),
            circuit: CircuitSettings::default(),
            sources: SourceCatalog::default(),
        }
    }
}

/// Values coming from the command line; `None`/empty means "keep the file value".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub include: Vec<Platform>,
    pub exclude: Vec<Platform>,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub output_json: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
}

impl ScraperConfig {
    /// Load from `path` (or [`DEFAULT_CONFIG_PATH`]). A missing file yields defaults; an
    /// unreadable or invalid one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "config file not found; using built-in defaults"
            );
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: ScraperConfig = if ext == "toml" {
            toml::from_str(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?
        };
        cfg.validated()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: ScraperConfig = serde_json::from_str(s).context("parsing JSON config")?;
        cfg.validated()
    }

    /// Reject unknown platform keys, clamp rates into [0,1], fill empty pools.
    pub fn validated(mut self) -> Result<Self> {
        for key in self.relevance_thresholds.per_platform.keys() {
            key.parse::<Platform>()
                .map_err(|e| anyhow!("relevance_thresholds: {e}"))?;
        }
        // Normalize alias keys ("blog" -> "blogs") so lookups by canonical name hit.
        self.relevance_thresholds.per_platform = self
            .relevance_thresholds
            .per_platform
            .into_iter()
            .filter_map(|(k, v)| {
                k.parse::<Platform>()
                    .ok()
                    .map(|p| (p.as_str().to_string(), clamp01(v)))
            })
            .collect();
        self.relevance_thresholds.default = clamp01(self.relevance_thresholds.default);
        self.alert_success_rate_threshold = clamp01(self.alert_success_rate_threshold);

        self.minnesota_keywords = clean_list(self.minnesota_keywords);
        self.coffee_keywords = clean_list(self.coffee_keywords);
        if self.minnesota_keywords.is_empty() && self.coffee_keywords.is_empty() {
            bail!("at least one keyword is required in minnesota_keywords or coffee_keywords");
        }
        if let Some(ua) = self.user_agents.take() {
            let ua = clean_list(ua);
            self.user_agents = (!ua.is_empty()).then_some(ua);
        }
        if self.max_body_chars == 0 {
            self.max_body_chars = DEFAULT_MAX_BODY_CHARS;
        }
        if self.fetch.max_concurrency == 0 {
            self.fetch.max_concurrency = 1;
        }
        if self.circuit.threshold == 0 {
            self.circuit.threshold = CircuitSettings::default().threshold;
        }
        if let Some(url) = &self.alert_webhook {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("alert_webhook must be an http(s) URL, got `{url}`");
            }
        }
        Ok(self)
    }

    pub fn apply_cli(&mut self, cli: CliOverrides) {
        if !cli.include.is_empty() {
            self.include_platforms = Some(cli.include);
        }
        if !cli.exclude.is_empty() {
            let mut ex = self.exclude_platforms.take().unwrap_or_default();
            ex.extend(cli.exclude);
            self.exclude_platforms = Some(ex);
        }
        if cli.limit.is_some() {
            self.per_platform_limit = cli.limit;
        }
        if cli.dry_run {
            self.dry_run = true;
        }
        if cli.output_json.is_some() {
            self.output_json = cli.output_json;
        }
        if let Some(db) = cli.db_path {
            self.db_path = db;
        }
        if let Some(dir) = cli.report_dir {
            self.report_dir = dir;
        }
    }

    /// Platforms to run, in declared order: include set (or all) minus the exclude set.
    pub fn enabled_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .iter()
            .copied()
            .filter(|p| {
                self.include_platforms
                    .as_ref()
                    .map_or(true, |inc| inc.contains(p))
            })
            .filter(|p| {
                !self
                    .exclude_platforms
                    .as_ref()
                    .is_some_and(|ex| ex.contains(p))
            })
            .collect()
    }

    pub fn user_agent_pool(&self) -> Vec<String> {
        self.user_agents
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_USER_AGENTS))
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn clamp01(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Trim, drop empties, dedup while keeping first-seen order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_keywords_and_threshold() {
        let cfg = ScraperConfig::default();
        assert!(!cfg.minnesota_keywords.is_empty());
        assert!(!cfg.coffee_keywords.is_empty());
        assert!((cfg.relevance_thresholds.default - 0.05).abs() < 1e-12);
        assert_eq!(cfg.enabled_platforms(), Platform::ALL.to_vec());
    }

    #[test]
    fn thresholds_fall_back_to_default() {
        let cfg = ScraperConfig::from_json_str(
            r#"{"relevance_thresholds": {"default": 0.2, "blog": 0.4, "reddit": 3.0}}"#,
        )
        .unwrap();
        let t = &cfg.relevance_thresholds;
        assert!((t.for_platform(Platform::Blogs) - 0.4).abs() < 1e-12);
        assert!((t.for_platform(Platform::Reddit) - 1.0).abs() < 1e-12);
        assert!((t.for_platform(Platform::Rss) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn unknown_platform_threshold_is_rejected() {
        let err = ScraperConfig::from_json_str(r#"{"relevance_thresholds": {"myspace": 0.1}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("myspace"));
    }

    #[test]
    fn include_and_exclude_combine() {
        let mut cfg = ScraperConfig::default();
        cfg.apply_cli(CliOverrides {
            include: vec![Platform::Reddit, Platform::Rss, Platform::Forums],
            exclude: vec![Platform::Forums],
            ..Default::default()
        });
        assert_eq!(cfg.enabled_platforms(), vec![Platform::Reddit, Platform::Rss]);
    }

    #[test]
    fn keyword_lists_are_trimmed_and_deduped() {
        let cfg = ScraperConfig::from_json_str(
            r#"{"minnesota_keywords": [" Duluth ", "duluth", ""], "coffee_keywords": ["Latte"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.minnesota_keywords, vec!["Duluth".to_string()]);
        assert_eq!(cfg.coffee_keywords, vec!["Latte".to_string()]);
    }
}

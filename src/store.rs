// src/store.rs
//! SQLite persistence: scraped content, per-platform run performance and the trend
//! snapshot audit trail. The schema is additive-only and migrates itself on open.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::analyze::{PlatformRunStats, TrendSnapshot};
use crate::error::PersistenceError;
use crate::ingest::types::{Platform, ScoredItem};

pub const SCHEMA_VERSION: u32 = 3;
/// Rows per multi-row INSERT statement.
pub const INSERT_CHUNK: usize = 50;

const UNIQUE_KEY_INDEX: &str = "idx_content_platform_hash";
const LOOKUP_INDEX: &str = "idx_content_platform_hash_lookup";

type Result<T> = std::result::Result<T, PersistenceError>;

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS content (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id           TEXT NOT NULL,
    platform         TEXT NOT NULL,
    source_url       TEXT NOT NULL,
    title            TEXT NOT NULL,
    body             TEXT NOT NULL,
    author           TEXT,
    published_at     TEXT,
    relevance_score  REAL NOT NULL,
    engagement_score REAL NOT NULL,
    content_hash     TEXT NOT NULL,
    simhash          TEXT NOT NULL,
    scraped_at       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS platform_performance (
    platform       TEXT PRIMARY KEY,
    run_id         TEXT NOT NULL,
    source_count   INTEGER NOT NULL,
    content_count  INTEGER NOT NULL,
    success_rate   REAL NOT NULL,
    avg_relevance  REAL NOT NULL,
    latency_p50_ms REAL NOT NULL,
    latency_p90_ms REAL NOT NULL,
    latency_p99_ms REAL NOT NULL,
    failure_count  INTEGER NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS trend_snapshot (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id           TEXT NOT NULL,
    analysis_date    TEXT NOT NULL,
    total_platforms  INTEGER NOT NULL,
    total_content    INTEGER NOT NULL,
    top_platforms    TEXT NOT NULL,
    trending_topics  TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    insights         TEXT NOT NULL
);
";

/// Columns added after v1, with the version that introduced them.
const ADDED_COLUMNS: &[(u32, &str, &str, &str)] = &[
    (2, "content", "token_count", "INTEGER NOT NULL DEFAULT 0"),
    (2, "content", "truncated", "INTEGER NOT NULL DEFAULT 0"),
    (2, "platform_performance", "retry_count", "INTEGER NOT NULL DEFAULT 0"),
    (3, "content", "minnesota_mentions", "INTEGER NOT NULL DEFAULT 0"),
    (3, "content", "coffee_mentions", "INTEGER NOT NULL DEFAULT 0"),
    (3, "platform_performance", "fallback_used", "INTEGER NOT NULL DEFAULT 0"),
];

const CONTENT_COLUMNS: &[&str] = &[
    "run_id",
    "platform",
    "source_url",
    "title",
    "body",
    "author",
    "published_at",
    "relevance_score",
    "engagement_score",
    "content_hash",
    "simhash",
    "scraped_at",
    "token_count",
    "truncated",
    "minnesota_mentions",
    "coffee_mentions",
];

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating parent directories) and migrate the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Create missing tables, then add every column newer than the recorded version.
    /// Safe to call any number of times. Never deletes or rewrites stored rows.
    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_SCHEMA)?;
        let current = self.recorded_version()?.unwrap_or(0);
        if current < SCHEMA_VERSION {
            for (version, table, column, decl) in ADDED_COLUMNS {
                if *version > current && !self.has_column(table, column)? {
                    self.conn.execute_batch(&format!(
                        "ALTER TABLE {table} ADD COLUMN {column} {decl}"
                    ))?;
                }
            }
        }
        self.ensure_content_key()?;
        if current >= SCHEMA_VERSION {
            return Ok(());
        }

        self.conn.execute(
            "INSERT INTO schema_meta (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            params![SCHEMA_VERSION],
        )?;
        info!(
            event = "schema_migrated",
            from = current,
            to = SCHEMA_VERSION,
            "schema migrated"
        );
        Ok(())
    }

    /// Index `(platform, content_hash)`: unique when the stored rows allow it, plain
    /// otherwise. Older databases may already hold repeats; those rows are kept.
    fn ensure_content_key(&self) -> Result<()> {
        if self.has_index(UNIQUE_KEY_INDEX)? {
            return Ok(());
        }
        let repeats: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT 1 FROM content GROUP BY platform, content_hash HAVING COUNT(*) > 1
             )",
            [],
            |r| r.get(0),
        )?;
        if repeats == 0 {
            self.conn.execute_batch(&format!(
                "DROP INDEX IF EXISTS {LOOKUP_INDEX};
                 CREATE UNIQUE INDEX {UNIQUE_KEY_INDEX} ON content (platform, content_hash);"
            ))?;
        } else {
            warn!(
                event = "schema_repeats_kept",
                repeated_keys = repeats,
                "content has repeated (platform, content_hash) rows; keeping a plain index"
            );
            self.conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {LOOKUP_INDEX} ON content (platform, content_hash);"
            ))?;
        }
        Ok(())
    }

    fn has_index(&self, name: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            params![name],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn recorded_version(&self) -> Result<Option<u32>> {
        Ok(self
            .conn
            .query_row("SELECT version FROM schema_meta WHERE id = 1", [], |r| {
                r.get(0)
            })
            .optional()?)
    }

    pub fn schema_version(&self) -> Result<u32> {
        Ok(self.recorded_version()?.unwrap_or(0))
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt.query_map([], |r| r.get::<_, String>(1))?;
        for name in names {
            if name? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Batched insert in one transaction. Items whose `(platform, content_hash)` is
    /// already stored, or repeated earlier in `items`, are skipped. Returns new rows.
    pub fn insert_content(&mut self, run_id: &str, items: &[ScoredItem]) -> Result<usize> {
        let mut seen = HashSet::new();
        let items: Vec<&ScoredItem> = items
            .iter()
            .filter(|i| seen.insert((i.raw.platform, i.content_hash.as_str())))
            .collect();
        if items.is_empty() {
            return Ok(0);
        }
        let scraped_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let row = format!("({})", vec!["?"; CONTENT_COLUMNS.len()].join(", "));
        let selected: Vec<String> = (1..=CONTENT_COLUMNS.len())
            .map(|i| format!("column{i}"))
            .collect();
        // `column2` is platform and `column10` is content_hash in CONTENT_COLUMNS order.
        let not_stored = "NOT EXISTS (SELECT 1 FROM content c \
             WHERE c.platform = v.column2 AND c.content_hash = v.column10)";

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for chunk in items.chunks(INSERT_CHUNK) {
            let sql = format!(
                "INSERT OR IGNORE INTO content ({}) SELECT {} FROM (VALUES {}) AS v WHERE {}",
                CONTENT_COLUMNS.join(", "),
                selected.join(", "),
                vec![row.as_str(); chunk.len()].join(", "),
                not_stored
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * CONTENT_COLUMNS.len());
            for item in chunk {
                values.extend(content_row(run_id, &scraped_at, item));
            }
            inserted += tx.execute(&sql, params_from_iter(values.iter()))?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Drop the platform's previous row and write this run's aggregate.
    pub fn replace_platform_performance(
        &mut self,
        run_id: &str,
        stats: &PlatformRunStats,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM platform_performance WHERE platform = ?1",
            params![stats.platform.as_str()],
        )?;
        tx.execute(
            "INSERT INTO platform_performance (
                platform, run_id, source_count, content_count, success_rate, avg_relevance,
                latency_p50_ms, latency_p90_ms, latency_p99_ms, failure_count, updated_at,
                retry_count, fallback_used
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                stats.platform.as_str(),
                run_id,
                stats.source_count as i64,
                stats.content_count as i64,
                stats.success_rate,
                stats.avg_relevance,
                stats.latency_p50_ms,
                stats.latency_p90_ms,
                stats.latency_p99_ms,
                stats.failure_count as i64,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                stats.retry_count,
                stats.fallback_used,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn append_trend_snapshot(&self, snap: &TrendSnapshot) -> Result<()> {
        self.conn.execute(
            "INSERT INTO trend_snapshot (
                run_id, analysis_date, total_platforms, total_content, top_platforms,
                trending_topics, confidence_score, insights
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snap.run_id,
                snap.analysis_date.to_rfc3339_opts(SecondsFormat::Secs, true),
                snap.total_platforms as i64,
                snap.total_content as i64,
                serde_json::to_string(&snap.top_platforms)?,
                serde_json::to_string(&snap.trending_topics)?,
                snap.confidence_score,
                serde_json::to_string(&snap.insights)?,
            ],
        )?;
        Ok(())
    }

    pub fn content_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM content", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn content_count_for(&self, platform: Platform) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM content WHERE platform = ?1",
            params![platform.as_str()],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn trend_snapshot_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trend_snapshot", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn platform_performance(&self, platform: Platform) -> Result<Option<PlatformRunStats>> {
        Ok(self
            .conn
            .query_row(
                "SELECT source_count, content_count, success_rate, avg_relevance,
                        latency_p50_ms, latency_p90_ms, latency_p99_ms, failure_count,
                        retry_count, fallback_used
                 FROM platform_performance WHERE platform = ?1",
                params![platform.as_str()],
                |r| {
                    Ok(PlatformRunStats {
                        platform,
                        source_count: r.get::<_, i64>(0)? as usize,
                        content_count: r.get::<_, i64>(1)? as usize,
                        success_rate: r.get(2)?,
                        avg_relevance: r.get(3)?,
                        latency_p50_ms: r.get(4)?,
                        latency_p90_ms: r.get(5)?,
                        latency_p99_ms: r.get(6)?,
                        failure_count: r.get::<_, i64>(7)? as usize,
                        retry_count: r.get(8)?,
                        fallback_used: r.get(9)?,
                    })
                },
            )
            .optional()?)
    }

    /// Number of rows in `platform_performance` (one per platform at most).
    pub fn platform_performance_rows(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM platform_performance", [], |r| {
                r.get(0)
            })?;
        Ok(n as usize)
    }
}

fn content_row(run_id: &str, scraped_at: &str, item: &ScoredItem) -> [Value; 16] {
    let raw = &item.raw;
    [
        Value::Text(run_id.to_string()),
        Value::Text(raw.platform.as_str().to_string()),
        Value::Text(raw.source_url.clone()),
        Value::Text(raw.title.clone()),
        Value::Text(raw.body.clone()),
        raw.author.clone().map_or(Value::Null, Value::Text),
        raw.published_at
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
            .map_or(Value::Null, Value::Text),
        Value::Real(item.relevance_score),
        Value::Real(item.engagement_score),
        Value::Text(item.content_hash.clone()),
        Value::Text(format!("{:016x}", item.simhash)),
        Value::Text(scraped_at.to_string()),
        Value::Integer(item.token_count as i64),
        Value::Integer(i64::from(item.truncated)),
        Value::Integer(item.minnesota_mentions as i64),
        Value::Integer(item.coffee_mentions as i64),
    ]
}

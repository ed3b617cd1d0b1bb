//! Append-only SQLite log of page scrapes and pairwise analyses.
//!
//! Every operation opens its own connection and closes it on return. Writes
//! run inside a single transaction.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

/// One stored fetch of a single URL.
#[derive(Debug, Clone, Serialize)]
pub struct PageScrape {
    pub id: i64,
    pub url: String,
    pub content: String,
    /// `None` when the stored value is missing or unreadable.
    pub timestamp: Option<DateTime<Utc>>,
    pub word_count: i64,
    pub char_count: i64,
}

/// Stored form of the keyword gap list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MissingKeywords {
    List(Vec<String>),
    /// Value that was not a JSON list; returned verbatim.
    Raw(String),
    /// Saved without a keyword list.
    NotComputed,
}

/// One stored comparison between two URLs.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub url1: String,
    pub url2: String,
    pub similarity: f64,
    pub missing_keywords: MissingKeywords,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ScrapeStore {
    path: PathBuf,
}

impl ScrapeStore {
    /// Open (or create) the database at `path` and make sure both tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let store = Self { path };
        store.create_tables()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scrapes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                content TEXT,
                timestamp TEXT,
                word_count INTEGER,
                char_count INTEGER
            );

            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url1 TEXT NOT NULL,
                url2 TEXT NOT NULL,
                similarity REAL,
                missing_keywords TEXT,
                timestamp TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_scrapes_url ON scrapes(url);
            CREATE INDEX IF NOT EXISTS idx_analyses_timestamp ON analyses(timestamp);
            ",
        )?;
        Ok(())
    }

    /// Append a scrape row. Counts are derived from `content` when omitted.
    pub fn save_scrape(
        &self,
        url: &str,
        content: &str,
        word_count: Option<usize>,
        char_count: Option<usize>,
    ) -> Result<i64> {
        let word_count = word_count.unwrap_or_else(|| content.split_whitespace().count());
        let char_count = char_count.unwrap_or_else(|| content.chars().count());

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO scrapes (url, content, timestamp, word_count, char_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![url, content, now_timestamp(), word_count as i64, char_count as i64],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(url, id, word_count, char_count, "Saved scrape");
        Ok(id)
    }

    /// Append an analysis row. `None` keywords are stored as an empty string,
    /// any list (including an empty one) as JSON.
    pub fn save_analysis(
        &self,
        url1: &str,
        url2: &str,
        similarity: f64,
        missing_keywords: Option<&[String]>,
    ) -> Result<i64> {
        let encoded = match missing_keywords {
            Some(keywords) => serde_json::to_string(keywords)?,
            None => String::new(),
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO analyses (url1, url2, similarity, missing_keywords, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![url1, url2, similarity, encoded, now_timestamp()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(url1, url2, similarity, id, "Saved analysis");
        Ok(id)
    }

    /// Most recent analyses first.
    pub fn get_recent_analyses(&self, limit: u32) -> Result<Vec<Analysis>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, url1, url2, similarity, missing_keywords, timestamp
             FROM analyses
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            let raw_keywords: Option<String> = row.get(4)?;
            Ok(Analysis {
                id: row.get(0)?,
                url1: row.get(1)?,
                url2: row.get(2)?,
                similarity: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                missing_keywords: decode_keywords(raw_keywords),
                timestamp: parse_timestamp(row.get(5)?),
            })
        })?;

        let mut analyses = Vec::new();
        for row in rows {
            analyses.push(row?);
        }
        Ok(analyses)
    }

    /// Most recent scrapes of one URL first.
    pub fn get_scrapes_for_url(&self, url: &str, limit: u32) -> Result<Vec<PageScrape>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, url, content, timestamp, word_count, char_count
             FROM scrapes
             WHERE url = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![url, limit], |row| {
            Ok(PageScrape {
                id: row.get(0)?,
                url: row.get(1)?,
                content: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                timestamp: parse_timestamp(row.get(3)?),
                word_count: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                char_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            })
        })?;

        let mut scrapes = Vec::new();
        for row in rows {
            scrapes.push(row?);
        }
        Ok(scrapes)
    }
}

// Fixed-width RFC 3339 so lexical order in SQLite matches time order.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Older rows hold naive UTC values (`2024-05-01T10:00:00.123456`) or SQLite's
/// `CURRENT_TIMESTAMP` form; both are read as UTC.
fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }

    let parsed = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc());
    if parsed.is_none() {
        warn!(timestamp = raw, "Unreadable stored timestamp");
    }
    parsed
}

fn decode_keywords(raw: Option<String>) -> MissingKeywords {
    match raw {
        None => MissingKeywords::NotComputed,
        Some(raw) if raw.is_empty() => MissingKeywords::NotComputed,
        Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) => MissingKeywords::List(list),
            Err(_) => MissingKeywords::Raw(raw),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, ScrapeStore) {
        let dir = TempDir::new().unwrap();
        let store = ScrapeStore::open(dir.path().join("scrapes.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn save_scrape_writes_given_counts() {
        let (_dir, store) = temp_store();
        store
            .save_scrape("http://example.com", "Hello world", Some(2), Some(11))
            .unwrap();

        let conn = Connection::open(store.path()).unwrap();
        let row: (String, String, i64, i64) = conn
            .query_row(
                "SELECT url, content, word_count, char_count FROM scrapes",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(
            row,
            ("http://example.com".to_string(), "Hello world".to_string(), 2, 11)
        );
    }

    #[test]
    fn save_scrape_computes_missing_counts() {
        let (_dir, store) = temp_store();
        store
            .save_scrape("http://example.com", "naïve café  menu", None, None)
            .unwrap();

        let scrapes = store.get_scrapes_for_url("http://example.com", 10).unwrap();
        assert_eq!(scrapes.len(), 1);
        assert_eq!(scrapes[0].word_count, 3);
        assert_eq!(scrapes[0].char_count, 16);
    }

    #[test]
    fn analysis_keywords_roundtrip_in_order() {
        let (_dir, store) = temp_store();
        let keywords = vec!["key1".to_string(), "key2".to_string(), "key3".to_string()];
        store
            .save_analysis(
                "http://example.com/page1",
                "http://example.com/page2",
                0.85,
                Some(keywords.as_slice()),
            )
            .unwrap();

        let conn = Connection::open(store.path()).unwrap();
        let stored: String = conn
            .query_row("SELECT missing_keywords FROM analyses", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, r#"["key1","key2","key3"]"#);

        let recent = store.get_recent_analyses(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].url1, "http://example.com/page1");
        assert_eq!(recent[0].similarity, 0.85);
        assert_eq!(recent[0].missing_keywords, MissingKeywords::List(keywords));
    }

    #[test]
    fn recent_analyses_newest_first_with_limit() {
        let (_dir, store) = temp_store();
        store
            .save_analysis("urlA", "urlB", 0.5, Some(&["x".to_string()][..]))
            .unwrap();
        store
            .save_analysis("urlC", "urlD", 0.9, Some(&["y".to_string(), "z".to_string()][..]))
            .unwrap();

        let all = store.get_recent_analyses(5).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].url1, "urlC");
        assert!(all[0].timestamp >= all[1].timestamp);

        let latest = store.get_recent_analyses(1).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].url2, "urlD");
        assert_eq!(latest[0].similarity, 0.9);
    }

    #[test]
    fn empty_list_and_not_computed_stay_distinct() {
        let (_dir, store) = temp_store();
        store.save_analysis("a", "b", 0.1, Some(&[][..])).unwrap();
        store.save_analysis("c", "d", 0.2, None).unwrap();

        let recent = store.get_recent_analyses(5).unwrap();
        assert_eq!(recent[0].missing_keywords, MissingKeywords::NotComputed);
        assert_eq!(recent[1].missing_keywords, MissingKeywords::List(vec![]));
    }

    #[test]
    fn malformed_keywords_fall_back_to_raw() {
        let (_dir, store) = temp_store();
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO analyses (url1, url2, similarity, missing_keywords, timestamp)
             VALUES ('a', 'b', 0.3, 'not json', ?1)",
            params![now_timestamp()],
        )
        .unwrap();

        let recent = store.get_recent_analyses(5).unwrap();
        assert_eq!(
            recent[0].missing_keywords,
            MissingKeywords::Raw("not json".to_string())
        );
    }

    #[test]
    fn legacy_and_missing_timestamps_still_list() {
        let (_dir, store) = temp_store();
        store.save_analysis("new1", "new2", 0.7, Some(&[][..])).unwrap();

        let conn = Connection::open(store.path()).unwrap();
        conn.execute_batch(
            "INSERT INTO analyses (url1, url2, similarity, missing_keywords, timestamp)
             VALUES ('old1', 'old2', 0.4, '[]', '2024-05-01T10:00:00.123456');
             INSERT INTO analyses (url1, url2, similarity, missing_keywords, timestamp)
             VALUES ('sql1', 'sql2', 0.2, '[]', '2023-01-02 03:04:05');
             INSERT INTO analyses (url1, url2, similarity, missing_keywords, timestamp)
             VALUES ('none1', 'none2', 0.1, '[]', NULL);
             INSERT INTO scrapes (url, content, timestamp, word_count, char_count)
             VALUES ('u', 'legacy text', '2024-05-01T10:00:00.123456', 2, 11);",
        )
        .unwrap();

        let recent = store.get_recent_analyses(10).unwrap();
        let urls: Vec<&str> = recent.iter().map(|a| a.url1.as_str()).collect();
        assert_eq!(urls, vec!["new1", "old1", "sql1", "none1"]);

        let legacy = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(recent[1].timestamp, Some(legacy));
        assert_eq!(
            recent[2].timestamp.map(|t| t.to_rfc3339()),
            Some("2023-01-02T03:04:05+00:00".to_string())
        );
        assert_eq!(recent[3].timestamp, None);

        let scrapes = store.get_scrapes_for_url("u", 5).unwrap();
        assert_eq!(scrapes.len(), 1);
        assert_eq!(scrapes[0].timestamp, Some(legacy));
    }

    #[test]
    fn open_is_idempotent_and_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data").join("seo.db");

        let first = ScrapeStore::open(&path).unwrap();
        first.save_scrape("u", "one two", None, None).unwrap();
        let second = ScrapeStore::open(&path).unwrap();

        assert_eq!(second.get_scrapes_for_url("u", 10).unwrap().len(), 1);
    }
}

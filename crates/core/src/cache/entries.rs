//! Cache entry CRUD operations.
//!
//! Provides functions for storing, matching and deleting captured
//! responses inside a named partition.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A fully captured response.
///
/// Header names are stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// URL the response was produced for.
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, status: u16, headers: BTreeMap<String, String>, body: Vec<u8>) -> Self {
        let headers = headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        Self { url: url.into(), status, headers, body }
    }

    /// Build a JSON response with the matching content type.
    pub fn json(url: impl Into<String>, status: u16, value: &serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self { url: url.into(), status, headers, body: value.to_string().into_bytes() }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub partition: String,
    pub key: String,
    pub method: String,
    pub url: String,
    pub response: CachedResponse,
    pub stored_at: String,
}

impl CacheEntry {
    /// Create an entry keyed by the request's method and normalized URL.
    pub fn new(partition: impl Into<String>, method: &str, url: &str, response: CachedResponse) -> Self {
        Self {
            partition: partition.into(),
            key: compute_cache_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            response,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

const SELECT_ENTRY: &str = "SELECT partition, key_hash, method, url, status, headers_json, body, stored_at
    FROM entries WHERE partition = ?1 AND key_hash = ?2";

/// Escape LIKE wildcards so the pattern matches literally.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(CacheEntry, String)> {
    let url: String = row.get(3)?;
    let entry = CacheEntry {
        partition: row.get(0)?,
        key: row.get(1)?,
        method: row.get(2)?,
        url: url.clone(),
        response: CachedResponse {
            url,
            status: row.get::<_, i64>(4)? as u16,
            headers: BTreeMap::new(),
            body: row.get(6)?,
        },
        stored_at: row.get(7)?,
    };
    Ok((entry, row.get(5)?))
}

fn decode_entry((mut entry, headers_json): (CacheEntry, String)) -> Result<CacheEntry, Error> {
    entry.response.headers = serde_json::from_str(&headers_json)?;
    Ok(entry)
}

fn insert_entry(tx: &rusqlite::Transaction<'_>, entry: &CacheEntry, headers_json: &str) -> Result<(), Error> {
    tx.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![&entry.partition, &entry.stored_at],
    )?;
    tx.execute(
        "INSERT INTO entries (partition, key_hash, method, url, status, headers_json, body, stored_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(partition, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            &entry.partition,
            &entry.key,
            &entry.method,
            &entry.url,
            entry.response.status as i64,
            headers_json,
            &entry.response.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Insert or replace an entry, creating its partition if needed.
    ///
    /// Uses UPSERT semantics: a second write for the same request
    /// replaces the first (last write wins).
    pub async fn put_entry(&self, entry: &CacheEntry) -> Result<(), Error> {
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.response.headers)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_entry(&tx, &entry, &headers_json)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of entries into one partition atomically.
    ///
    /// Either the partition and every entry are committed, or nothing is.
    /// Returns the number of entries written.
    pub async fn put_all(&self, partition: &str, entries: Vec<CacheEntry>) -> Result<usize, Error> {
        let partition = partition.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let encoded = entries
            .into_iter()
            .map(|entry| Ok((serde_json::to_string(&entry.response.headers)?, entry)))
            .collect::<Result<Vec<_>, Error>>()?;

        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![&partition, &now],
                )?;
                for (headers_json, entry) in &encoded {
                    if entry.partition != partition {
                        return Err(Error::InvalidInput(format!(
                            "entry for {} targets partition {}, expected {}",
                            entry.url, entry.partition, partition
                        )));
                    }
                    insert_entry(&tx, entry, headers_json)?;
                }
                tx.commit()?;
                Ok(encoded.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a request in one partition.
    ///
    /// Returns None on a miss or if the partition doesn't exist.
    pub async fn match_entry(&self, partition: &str, method: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let partition = partition.to_string();
        let key = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let row = conn
                    .query_row(SELECT_ENTRY, params![partition, key], read_entry)
                    .optional()?;
                row.map(decode_entry).transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a request across several partitions, first hit wins.
    pub async fn match_in(&self, partitions: &[&str], method: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let partitions: Vec<String> = partitions.iter().map(|p| p.to_string()).collect();
        let key = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(SELECT_ENTRY)?;
                for partition in &partitions {
                    if let Some(row) = stmt.query_row(params![partition, &key], read_entry).optional()? {
                        return decode_entry(row).map(Some);
                    }
                }
                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the entry for a request.
    ///
    /// Returns false if there was nothing to delete.
    pub async fn delete_entry(&self, partition: &str, method: &str, url: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let key = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM entries WHERE partition = ?1 AND key_hash = ?2", params![partition, key])?;
                Ok(deleted == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in a partition, oldest first.
    pub async fn entry_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url FROM entries WHERE partition = ?1 ORDER BY stored_at ASC, url ASC")?;
                let urls = stmt
                    .query_map(params![partition], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a partition.
    pub async fn count_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries in a partition whose URL contains `pattern` literally.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_matching(&self, partition: &str, pattern: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        let pattern = format!("%{}%", escape_like(pattern));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND url LIKE ?2 ESCAPE '\\'",
                    params![partition, pattern],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge oldest entries of a partition until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_entries(&self, partition: &str, max_entries: usize) -> Result<u64, Error> {
        let partition = partition.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![&partition], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key_hash IN (
                    SELECT key_hash FROM entries WHERE partition = ?1 ORDER BY stored_at ASC LIMIT ?2
                )",
                    params![&partition, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIC: &str = "safenest-static-v1.0.0";

    fn make_entry(partition: &str, url: &str, body: &str) -> CacheEntry {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/css".to_string());
        let response = CachedResponse::new(url, 200, headers, body.as_bytes().to_vec());
        CacheEntry::new(partition, "GET", url, response)
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry(STATIC, "https://example.com/app.css", "body{}");

        db.put_entry(&entry).await.unwrap();

        let found = db
            .match_entry(STATIC, "GET", "https://example.com/app.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.response.body, b"body{}");
        assert_eq!(found.response.content_type(), Some("text/css"));
        assert!(db.has_partition(STATIC).await.unwrap());
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.match_entry(STATIC, "GET", "https://example.com/").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_match_is_method_scoped() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/a", "a"))
            .await
            .unwrap();

        let head = db.match_entry(STATIC, "HEAD", "https://example.com/a").await.unwrap();
        assert!(head.is_none());
    }

    #[tokio::test]
    async fn test_upsert_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/a", "old"))
            .await
            .unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/a", "new"))
            .await
            .unwrap();

        assert_eq!(db.count_entries(STATIC).await.unwrap(), 1);
        let found = db.match_entry(STATIC, "GET", "https://example.com/a").await.unwrap().unwrap();
        assert_eq!(found.response.body, b"new");
    }

    #[tokio::test]
    async fn test_put_all_atomic() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![
            make_entry(STATIC, "https://example.com/", "<html>"),
            make_entry("other-partition", "https://example.com/app.css", "body{}"),
        ];

        let result = db.put_all(STATIC, entries).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!db.has_partition(STATIC).await.unwrap());
        assert!(!db.has_partition("other-partition").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_all_creates_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let written = db.put_all(STATIC, Vec::new()).await.unwrap();
        assert_eq!(written, 0);
        assert!(db.has_partition(STATIC).await.unwrap());
    }

    #[tokio::test]
    async fn test_match_in_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry("first", "https://example.com/", "first"))
            .await
            .unwrap();
        db.put_entry(&make_entry("second", "https://example.com/", "second"))
            .await
            .unwrap();

        let found = db
            .match_in(&["second", "first"], "GET", "https://example.com/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.partition, "second");

        let none = db.match_in(&["third"], "GET", "https://example.com/").await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_delete_partition_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/a", "a"))
            .await
            .unwrap();

        assert!(db.delete_partition(STATIC).await.unwrap());
        assert_eq!(db.count_entries(STATIC).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/a", "a"))
            .await
            .unwrap();

        assert!(db.delete_entry(STATIC, "get", "https://example.com/a").await.unwrap());
        assert!(!db.delete_entry(STATIC, "GET", "https://example.com/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_matching() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/static/css/a.css", "a"))
            .await
            .unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/static/js/b.js", "b"))
            .await
            .unwrap();

        let deleted = db.purge_entries_matching(STATIC, "/css/").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.entry_urls(STATIC).await.unwrap(), vec!["https://example.com/static/js/b.js".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_matching_wildcards_are_literal() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/static/js/app.js", "a"))
            .await
            .unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/api/search?q=100%25_off", "b"))
            .await
            .unwrap();

        assert_eq!(db.purge_entries_matching(STATIC, "%").await.unwrap(), 1);
        assert_eq!(db.purge_entries_matching(STATIC, "_").await.unwrap(), 0);
        assert_eq!(db.entry_urls(STATIC).await.unwrap(), vec!["https://example.com/static/js/app.js".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_lru() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut old = make_entry(STATIC, "https://example.com/old", "old");
        old.stored_at = "2020-01-01T00:00:00+00:00".to_string();
        db.put_entry(&old).await.unwrap();
        db.put_entry(&make_entry(STATIC, "https://example.com/new", "new"))
            .await
            .unwrap();

        let deleted = db.purge_lru_entries(STATIC, 1).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.entry_urls(STATIC).await.unwrap(), vec!["https://example.com/new".to_string()]);
        assert_eq!(db.purge_lru_entries(STATIC, 1).await.unwrap(), 0);
    }

    #[test]
    fn test_response_helpers() {
        let response = CachedResponse::json("https://example.com/api/x", 503, &serde_json::json!({"error": "Offline"}));
        assert!(!response.is_success());
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.text(), r#"{"error":"Offline"}"#);
    }
}

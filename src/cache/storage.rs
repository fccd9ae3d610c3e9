//! Response cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::types::CachedResponse;

/// Trait for response cache backends.
///
/// A backend holds complete responses keyed by request identity, partitioned
/// into named generations. Exactly one generation is current; activating it
/// purges every other generation wholesale.
pub trait ResponseCache: Send + Sync {
  /// The current generation name (e.g. "fresh-meat-v1.0.0").
  fn generation(&self) -> &str;

  /// Look up a response in the current generation.
  fn get(&self, key: &str) -> Result<Option<CachedResponse>>;

  /// Store or overwrite a response in the current generation.
  fn put(&self, key: &str, response: &CachedResponse) -> Result<()>;

  /// Purge every generation other than the current one.
  ///
  /// Returns the number of entries removed.
  fn activate(&self) -> Result<usize>;
}

/// Cache backend that stores nothing.
/// Used when caching is disabled - every lookup misses and writes are discarded.
pub struct NoopCache {
  generation: String,
}

impl NoopCache {
  pub fn new(generation: impl Into<String>) -> Self {
    Self {
      generation: generation.into(),
    }
  }
}

impl ResponseCache for NoopCache {
  fn generation(&self) -> &str {
    &self.generation
  }

  fn get(&self, _key: &str) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn put(&self, _key: &str, _response: &CachedResponse) -> Result<()> {
    Ok(()) // Discard
  }

  fn activate(&self) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-backed response cache.
pub struct SqliteCache {
  conn: Mutex<Connection>,
  generation: String,
}

/// Schema for the response cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_generation
    ON response_cache(generation);
"#;

impl SqliteCache {
  /// Open or create the cache database inside the given data directory.
  pub fn open_in(dir: &Path, generation: impl Into<String>) -> Result<Self> {
    Self::open_at(&dir.join("responses.db"), generation)
  }

  /// Open or create the cache database at an explicit path.
  pub fn open_at(path: &Path, generation: impl Into<String>) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open response cache at {}: {}", path.display(), e))?;

    Self::with_connection(conn, generation)
  }

  /// In-memory cache, used by tests.
  pub fn open_in_memory(generation: impl Into<String>) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn, generation)
  }

  fn with_connection(conn: Connection, generation: impl Into<String>) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      generation: generation.into(),
    })
  }

}

impl ResponseCache for SqliteCache {
  fn generation(&self) -> &str {
    &self.generation
  }

  fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body FROM response_cache
         WHERE generation = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare cache lookup: {}", e))?;

    let row: Option<(u16, String, Vec<u8>)> = stmt
      .query_row(params![self.generation, key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .ok();

    match row {
      Some((status, headers_json, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to decode cached headers: {}", e))?;
        Ok(Some(CachedResponse::new(status, headers, body)))
      }
      None => Ok(None),
    }
  }

  fn put(&self, key: &str, response: &CachedResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers_json = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to encode headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (generation, request_key, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![self.generation, key, response.status, headers_json, response.body],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn activate(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let removed = conn
      .execute(
        "DELETE FROM response_cache WHERE generation != ?",
        params![self.generation],
      )
      .map_err(|e| eyre!("Failed to purge old generations: {}", e))?;

    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &str) -> CachedResponse {
    CachedResponse::new(
      200,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  #[test]
  fn test_put_then_get_round_trip() {
    let cache = SqliteCache::open_in_memory("fresh-meat-v1.0.0").unwrap();
    cache.put("key-a", &response("hello")).unwrap();

    let got = cache.get("key-a").unwrap().unwrap();
    assert_eq!(got.status, 200);
    assert_eq!(got.body, b"hello");
    assert_eq!(got.header("content-type"), Some("text/plain"));
  }

  #[test]
  fn test_get_miss_returns_none() {
    let cache = SqliteCache::open_in_memory("fresh-meat-v1.0.0").unwrap();
    assert!(cache.get("absent").unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_existing_entry() {
    let cache = SqliteCache::open_in_memory("fresh-meat-v1.0.0").unwrap();
    cache.put("key-a", &response("old")).unwrap();
    cache.put("key-a", &response("new")).unwrap();

    let got = cache.get("key-a").unwrap().unwrap();
    assert_eq!(got.body, b"new");
  }

  #[test]
  fn test_activation_purges_other_generations() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(CACHE_SCHEMA).unwrap();
    conn
      .execute(
        "INSERT INTO response_cache (generation, request_key, status, headers, body)
         VALUES ('fresh-meat-v0.9.0', 'stale-key', 200, '[]', x'00')",
        [],
      )
      .unwrap();

    let cache = SqliteCache::with_connection(conn, "fresh-meat-v1.0.0").unwrap();
    cache.put("new-key", &response("fresh")).unwrap();

    let removed = cache.activate().unwrap();
    assert_eq!(removed, 1);
    // The current generation survives the purge
    assert!(cache.get("new-key").unwrap().is_some());
  }

  #[test]
  fn test_noop_cache_always_misses() {
    let cache = NoopCache::new("fresh-meat-v1.0.0");
    cache.put("key-a", &response("hello")).unwrap();
    assert!(cache.get("key-a").unwrap().is_none());
    assert_eq!(cache.activate().unwrap(), 0);
  }
}

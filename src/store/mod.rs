//! The durable local store: pending orders, the cart snapshot, cached product
//! records, and preferences, surviving process restarts.
//!
//! Every operation is an independent transaction on its own collection; no
//! cross-collection transactions exist. A store failure is returned as `Err`
//! so callers can log it and continue in degraded (non-persistent) mode.

pub mod schema;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Database file name. The schema version lives in SQLite's user_version.
const DB_FILE: &str = "FreshMeatOffline.db";

/// An order captured while offline, awaiting replay.
#[derive(Debug, Clone)]
pub struct PendingOrder {
  pub id: i64,
  pub payload: serde_json::Value,
  pub synced: bool,
  pub created_at: DateTime<Utc>,
}

/// One line of the locally-recorded cart snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartEntry {
  pub store_product_id: i64,
  pub quantity: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
}

/// A cached product record for offline browsing.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
  pub id: i64,
  pub name: String,
  pub category: Option<String>,
  pub store: Option<String>,
  pub data: serde_json::Value,
}

/// Durable local store backed by SQLite.
pub struct OfflineStore {
  conn: Mutex<Connection>,
}

impl OfflineStore {
  /// Open or create the store inside the given data directory.
  pub fn open_in(dir: &Path) -> Result<Self> {
    Self::open_at(&dir.join(DB_FILE))
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open local store at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// In-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;
    conn
      .pragma_update(None, "user_version", schema::SCHEMA_VERSION)
      .map_err(|e| eyre!("Failed to set schema version: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  // --------------------------------------------------------------------
  // orders
  // --------------------------------------------------------------------

  /// Queue an order payload for later replay. Returns the assigned id.
  pub fn queue_order(&self, payload: &serde_json::Value) -> Result<i64> {
    let conn = self.lock()?;
    let payload_json =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize order: {}", e))?;

    conn
      .execute(
        "INSERT INTO orders (payload, synced) VALUES (?, 0)",
        params![payload_json],
      )
      .map_err(|e| eyre!("Failed to queue order: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// Unsynced orders, oldest first.
  pub fn pending_orders(&self) -> Result<Vec<PendingOrder>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, payload, synced, created_at FROM orders
         WHERE synced = 0 ORDER BY created_at, id",
      )
      .map_err(|e| eyre!("Failed to prepare order query: {}", e))?;

    let orders = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, bool>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query orders: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|(id, payload, synced, created_at)| {
        let payload = serde_json::from_str(&payload).ok()?;
        let created_at = parse_datetime(&created_at).ok()?;
        Some(PendingOrder {
          id,
          payload,
          synced,
          created_at,
        })
      })
      .collect();

    Ok(orders)
  }

  /// Flip an order to synced after confirmed server acceptance.
  pub fn mark_order_synced(&self, id: i64) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("UPDATE orders SET synced = 1 WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to mark order synced: {}", e))?;
    Ok(())
  }

  /// Remove an order record. Only synced orders are ever removed.
  pub fn remove_order(&self, id: i64) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM orders WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove order: {}", e))?;
    Ok(())
  }

  /// Count of orders still awaiting replay.
  pub fn pending_order_count(&self) -> Result<i64> {
    let conn = self.lock()?;
    conn
      .query_row("SELECT COUNT(*) FROM orders WHERE synced = 0", [], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to count orders: {}", e))
  }

  // --------------------------------------------------------------------
  // cart
  // --------------------------------------------------------------------

  /// Replace the whole cart snapshot in one transaction.
  ///
  /// No per-item diffing: every local mutation records the full collection.
  pub fn replace_cart(&self, entries: &[CartEntry]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cart", [])
      .map_err(|e| eyre!("Failed to clear cart: {}", e))?;

    for entry in entries {
      let metadata = entry
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| eyre!("Failed to serialize cart metadata: {}", e))?;

      tx.execute(
        "INSERT INTO cart (store_product_id, quantity, metadata, updated_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![entry.store_product_id, entry.quantity, metadata],
      )
      .map_err(|e| eyre!("Failed to store cart entry: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit cart snapshot: {}", e))?;

    Ok(())
  }

  /// The recorded cart snapshot, keyed by product id.
  pub fn cart_entries(&self) -> Result<Vec<CartEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT store_product_id, quantity, metadata FROM cart ORDER BY store_product_id")
      .map_err(|e| eyre!("Failed to prepare cart query: {}", e))?;

    let entries = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, u32>(1)?,
          row.get::<_, Option<String>>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query cart: {}", e))?
      .filter_map(|r| r.ok())
      .map(|(store_product_id, quantity, metadata)| CartEntry {
        store_product_id,
        quantity,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
      })
      .collect();

    Ok(entries)
  }

  /// Clear the cart snapshot after a successful batch sync.
  pub fn clear_cart(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM cart", [])
      .map_err(|e| eyre!("Failed to clear cart: {}", e))?;
    Ok(())
  }

  // --------------------------------------------------------------------
  // products
  // --------------------------------------------------------------------

  /// Upsert product snapshots in one transaction.
  pub fn put_products(&self, snapshots: &[ProductSnapshot]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for snapshot in snapshots {
      let data = serde_json::to_string(&snapshot.data)
        .map_err(|e| eyre!("Failed to serialize product: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO products (id, name, category, store, data, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![
          snapshot.id,
          snapshot.name,
          snapshot.category,
          snapshot.store,
          data
        ],
      )
      .map_err(|e| eyre!("Failed to store product: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit products: {}", e))?;

    Ok(())
  }

  pub fn get_product(&self, id: i64) -> Result<Option<ProductSnapshot>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT id, name, category, store, data FROM products WHERE id = ?",
        params![id],
        row_to_product,
      )
      .optional()
      .map_err(|e| eyre!("Failed to query product: {}", e))
  }

  pub fn products_by_category(&self, category: &str) -> Result<Vec<ProductSnapshot>> {
    self.products_where("category", category)
  }

  pub fn products_by_store(&self, store: &str) -> Result<Vec<ProductSnapshot>> {
    self.products_where("store", store)
  }

  fn products_where(&self, column: &str, value: &str) -> Result<Vec<ProductSnapshot>> {
    let conn = self.lock()?;
    // column is one of the two indexed names above, never user input
    let sql = format!(
      "SELECT id, name, category, store, data FROM products WHERE {} = ? ORDER BY name",
      column
    );
    let mut stmt = conn
      .prepare(&sql)
      .map_err(|e| eyre!("Failed to prepare product query: {}", e))?;

    let products = stmt
      .query_map(params![value], row_to_product)
      .map_err(|e| eyre!("Failed to query products: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(products)
  }

  // --------------------------------------------------------------------
  // preferences
  // --------------------------------------------------------------------

  pub fn set_preference(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO preferences (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to set preference: {}", e))?;
    Ok(())
  }

  pub fn get_preference(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT value FROM preferences WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to get preference: {}", e))
  }
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductSnapshot> {
  let data: String = row.get(4)?;
  Ok(ProductSnapshot {
    id: row.get(0)?,
    name: row.get(1)?,
    category: row.get(2)?,
    store: row.get(3)?,
    data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
  })
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

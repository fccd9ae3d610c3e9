//! Schema for the durable local store.

/// Local database schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Migration batch. Idempotent: creating a collection that already exists is
/// a no-op, never an error.
pub const SCHEMA: &str = r#"
-- Orders submitted while offline, drained oldest-first on reconnect
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_orders_created ON orders(created_at);
CREATE INDEX IF NOT EXISTS idx_orders_synced ON orders(synced);

-- Full cart snapshot, replaced wholesale on every local mutation
CREATE TABLE IF NOT EXISTS cart (
    store_product_id INTEGER PRIMARY KEY,
    quantity INTEGER NOT NULL,
    metadata TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached product snapshots for offline browsing
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    store TEXT,
    data TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
CREATE INDEX IF NOT EXISTS idx_products_store ON products(store);

-- Small key/value preferences (zip code, last store, ...)
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

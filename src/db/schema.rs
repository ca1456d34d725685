/// Schema for the persistent local store.
///
/// One database file holds everything that must survive a restart: the
/// business-partitioned entity caches, the outbox, the interception layer's
/// runtime response cache, key/value settings and per-collection sync
/// metadata.
pub const SCHEMA: &str = r#"
-- Business-partitioned entity cache (serialized JSON + extracted index columns)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_kind TEXT NOT NULL,
    business_id INTEGER NOT NULL,
    record_id INTEGER NOT NULL,
    category_id INTEGER,
    name TEXT NOT NULL,
    secondary TEXT,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_kind, business_id, record_id)
);

CREATE INDEX IF NOT EXISTS idx_entity_cache_category
    ON entity_cache(entity_kind, business_id, category_id);

-- Durable queue of write intents awaiting server confirmation
CREATE TABLE IF NOT EXISTS outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload BLOB NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    error TEXT,
    created_at TEXT NOT NULL,
    synced_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status, id);

-- Runtime response cache, keyed by the exact outgoing request
CREATE TABLE IF NOT EXISTS response_cache (
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    version TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (method, url)
);

-- Key/value settings
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Per-collection sync metadata (last sync time + snapshot hash)
CREATE TABLE IF NOT EXISTS sync_meta (
    collection TEXT PRIMARY KEY,
    last_sync TEXT NOT NULL,
    data_hash TEXT
);
"#;

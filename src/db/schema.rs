/// Schema for the local store and the response cache.
pub const SCHEMA: &str = r#"
-- Records of every named store (serialized JSON).
-- seq preserves insertion order across upserts.
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    store TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (store, record_key)
);

-- Secondary index values extracted at write time
CREATE TABLE IF NOT EXISTS record_indexes (
    store TEXT NOT NULL,
    index_name TEXT NOT NULL,
    index_value TEXT NOT NULL,
    record_key TEXT NOT NULL,
    PRIMARY KEY (store, index_name, record_key)
);

CREATE INDEX IF NOT EXISTS idx_record_indexes_lookup
    ON record_indexes(store, index_name, index_value);

-- Named HTTP response caches
CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, url_hash)
);
"#;

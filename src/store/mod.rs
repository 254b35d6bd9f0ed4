use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::warn;

pub mod models;
use models::TeamScore;

/// Key under which the leaderboard watermark is persisted (stringified integer).
pub const WATERMARK_KEY: &str = "latestUpdate";
/// Key under which the accepted leaderboard snapshot is persisted (JSON array).
pub const SNAPSHOT_KEY: &str = "leaderboardData";

/// Thread-safe SQLite key-value store (single connection with mutex).
///
/// Survives restarts so a freshly constructed sync service resumes from the
/// last accepted snapshot instead of starting blank. Only the poll loop
/// writes; subscribers read. Absent or corrupt entries degrade to "no cache",
/// never to an error.
#[derive(Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    /// Open (or create) the cache database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(CacheStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Read a raw value, `None` if the key was never written.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or overwrite a raw value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cache (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Last accepted watermark; 0 when absent or unreadable.
    pub fn load_watermark(&self) -> i64 {
        match self.get(WATERMARK_KEY) {
            Ok(Some(raw)) => match raw.parse::<i64>() {
                Ok(watermark) => watermark,
                Err(_) => {
                    warn!("Cached watermark {:?} is not an integer, ignoring", raw);
                    0
                }
            },
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to read cached watermark: {:#}", e);
                0
            }
        }
    }

    /// Last accepted leaderboard snapshot; `None` when absent or corrupt.
    pub fn load_snapshot(&self) -> Option<Vec<TeamScore>> {
        let raw = match self.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read cached leaderboard: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Cached leaderboard is corrupt, ignoring: {}", e);
                None
            }
        }
    }

    /// Persist an accepted snapshot together with its watermark.
    pub fn save_leaderboard(&self, watermark: i64, snapshot: &[TeamScore]) -> Result<()> {
        self.set(WATERMARK_KEY, &watermark.to_string())?;
        self.set(SNAPSHOT_KEY, &serde_json::to_string(snapshot)?)?;
        Ok(())
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

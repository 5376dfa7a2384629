//! Append-only usage log persistence.
//!
//! [`UsageStore`] is the persistence boundary for quota accounting: insert
//! one immutable row per upstream attempt, and aggregate rows over a
//! trailing window. [`SqliteUsageStore`] is the durable implementation;
//! tests swap in recording fakes.
//!
//! Aggregation is served by two indexes: a composite
//! `(provider, model, ts DESC)` for per-model windows and a bare
//! `(ts DESC)` for time-bounded maintenance scans.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::{GatewayError, Result};

/// One immutable record of a single attempted upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    /// UTC wall clock at the moment of recording.
    pub ts: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub request_tokens: u64,
    pub response_tokens: u64,
    /// Always `request_tokens + response_tokens`; enforced by construction.
    pub total_tokens: u64,
    pub success: bool,
    /// Upstream HTTP status for failed attempts, when one was observed.
    pub error_code: Option<u16>,
}

impl UsageRecord {
    /// Build a record timestamped now.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        request_tokens: u64,
        response_tokens: u64,
        success: bool,
        error_code: Option<u16>,
    ) -> Self {
        Self::at(
            Utc::now(),
            provider,
            model,
            request_tokens,
            response_tokens,
            success,
            error_code,
        )
    }

    /// Build a record with an explicit timestamp. Used by tests to seed
    /// historical rows; the request path always records at now.
    pub fn at(
        ts: DateTime<Utc>,
        provider: impl Into<String>,
        model: impl Into<String>,
        request_tokens: u64,
        response_tokens: u64,
        success: bool,
        error_code: Option<u16>,
    ) -> Self {
        Self {
            ts,
            provider: provider.into(),
            model: model.into(),
            request_tokens,
            response_tokens,
            total_tokens: request_tokens + response_tokens,
            success,
            error_code,
        }
    }
}

/// Row count and token sum over one trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub requests: u64,
    pub tokens: u64,
}

/// The persistence boundary for usage accounting.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append one row. Rows are never updated or deleted.
    async fn insert(&self, record: &UsageRecord) -> Result<()>;

    /// Count rows and sum `total_tokens` for `(provider, model)` with
    /// `ts >= since`.
    async fn aggregate_since(
        &self,
        provider: &str,
        model: &str,
        since: DateTime<Utc>,
    ) -> Result<WindowStats>;
}

/// SQLite-backed usage store.
///
/// A single connection behind a mutex; inserts and window aggregates are
/// short statements, so contention stays negligible at gateway scale.
pub struct SqliteUsageStore {
    conn: Mutex<Connection>,
}

impl SqliteUsageStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Storage(format!(
                    "failed to create store directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store. Useful for tests and ephemeral deployments.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;

             CREATE TABLE IF NOT EXISTS usage_logs (
                 id              INTEGER PRIMARY KEY AUTOINCREMENT,
                 ts              INTEGER NOT NULL,
                 provider        TEXT    NOT NULL,
                 model           TEXT    NOT NULL,
                 request_tokens  INTEGER NOT NULL,
                 response_tokens INTEGER NOT NULL,
                 total_tokens    INTEGER NOT NULL,
                 success         INTEGER NOT NULL,
                 error_code      INTEGER
             );
             CREATE INDEX IF NOT EXISTS idx_usage_provider_model_ts
                 ON usage_logs (provider, model, ts DESC);
             CREATE INDEX IF NOT EXISTS idx_usage_ts
                 ON usage_logs (ts DESC);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Storage("usage store mutex poisoned".into()))
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn insert(&self, record: &UsageRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO usage_logs
                 (ts, provider, model, request_tokens, response_tokens,
                  total_tokens, success, error_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.ts.timestamp_millis(),
                record.provider,
                record.model,
                record.request_tokens,
                record.response_tokens,
                record.total_tokens,
                record.success,
                record.error_code,
            ],
        )?;
        Ok(())
    }

    async fn aggregate_since(
        &self,
        provider: &str,
        model: &str,
        since: DateTime<Utc>,
    ) -> Result<WindowStats> {
        let conn = self.lock()?;
        let (requests, tokens) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_tokens), 0)
             FROM usage_logs
             WHERE provider = ?1 AND model = ?2 AND ts >= ?3",
            params![provider, model, since.timestamp_millis()],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        Ok(WindowStats { requests, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn record_totals_are_enforced_by_construction() {
        let record = UsageRecord::new("p", "m", 10, 25, true, None);
        assert_eq!(record.total_tokens, 35);

        let failed = UsageRecord::new("p", "m", 0, 0, false, Some(503));
        assert_eq!(failed.total_tokens, 0);
        assert_eq!(failed.error_code, Some(503));
    }

    #[tokio::test]
    async fn aggregate_filters_by_provider_model_and_time() {
        let store = SqliteUsageStore::in_memory().unwrap();
        let now = Utc::now();

        store
            .insert(&UsageRecord::at(now, "p1", "m1", 10, 20, true, None))
            .await
            .unwrap();
        store
            .insert(&UsageRecord::at(now, "p1", "m2", 100, 0, true, None))
            .await
            .unwrap();
        store
            .insert(&UsageRecord::at(
                now - Duration::minutes(2),
                "p1",
                "m1",
                1,
                1,
                true,
                None,
            ))
            .await
            .unwrap();

        let minute = store
            .aggregate_since("p1", "m1", now - Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(
            minute,
            WindowStats {
                requests: 1,
                tokens: 30
            }
        );

        let day = store
            .aggregate_since("p1", "m1", now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(
            day,
            WindowStats {
                requests: 2,
                tokens: 32
            }
        );
    }

    #[tokio::test]
    async fn boundary_rows_are_included() {
        let store = SqliteUsageStore::in_memory().unwrap();
        let now = Utc::now();
        let boundary = now - Duration::seconds(60);

        store
            .insert(&UsageRecord::at(boundary, "p", "m", 5, 5, true, None))
            .await
            .unwrap();

        let stats = store.aggregate_since("p", "m", boundary).await.unwrap();
        assert_eq!(stats.requests, 1);
    }

    #[tokio::test]
    async fn empty_store_aggregates_to_zero() {
        let store = SqliteUsageStore::in_memory().unwrap();
        let stats = store
            .aggregate_since("p", "m", Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(stats, WindowStats::default());
    }
}

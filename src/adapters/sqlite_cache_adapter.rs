//! SQLite-backed bar cache.
//!
//! One row per cached series in `responses` with its store time, and the
//! series itself in `bars`. Non-finite prices are stored as NULL and read
//! back as NaN.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::Bar;
use crate::ports::bar_store_port::BarStore;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::fs;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn pool_error(e: r2d2::Error) -> ScanError {
    ScanError::Cache {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> ScanError {
    ScanError::Cache {
        reason: e.to_string(),
    }
}

fn stored(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

pub struct SqliteBarStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteBarStore {
    /// Opens or creates the cache file, creating its directory if needed.
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ScanError::Cache {
                reason: format!("{}: {}", parent.display(), e),
            })?;
        }
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(pool_error)?;
        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, ScanError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;
        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), ScanError> {
        let conn = self.pool.get().map_err(pool_error)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                stored_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS bars (
                key TEXT NOT NULL,
                ts INTEGER NOT NULL,
                open REAL,
                high REAL,
                low REAL,
                close REAL,
                volume REAL,
                PRIMARY KEY (key, ts)
            );",
        )
        .map_err(query_error)
    }
}

impl BarStore for SqliteBarStore {
    fn load(&self, key: &str, max_age: Duration) -> Result<Option<Vec<Bar>>, ScanError> {
        let conn = self.pool.get().map_err(pool_error)?;
        let stored_at: Option<i64> = conn
            .query_row(
                "SELECT stored_at FROM responses WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)?;
        let Some(stored_at) = stored_at else {
            return Ok(None);
        };
        let age = Utc::now().timestamp_millis() - stored_at;
        let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        if !(0..max_age).contains(&age) {
            return Ok(None);
        }

        let mut stmt = conn
            .prepare(
                "SELECT ts, open, high, low, close, volume FROM bars
                 WHERE key = ?1 ORDER BY ts",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![key], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    [
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                    ],
                ))
            })
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            let (ts, values) = row.map_err(query_error)?;
            let timestamp = DateTime::<Utc>::from_timestamp(ts, 0).ok_or_else(|| {
                ScanError::Cache {
                    reason: format!("{}: bad timestamp {}", key, ts),
                }
            })?;
            let [open, high, low, close, volume] = values.map(|v| v.unwrap_or(f64::NAN));
            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        Ok(Some(bars))
    }

    fn save(&self, key: &str, bars: &[Bar]) -> Result<(), ScanError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;
        tx.execute("DELETE FROM bars WHERE key = ?1", params![key])
            .map_err(query_error)?;
        tx.execute(
            "INSERT OR REPLACE INTO responses (key, stored_at) VALUES (?1, ?2)",
            params![key, Utc::now().timestamp_millis()],
        )
        .map_err(query_error)?;
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (key, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    key,
                    bar.timestamp.timestamp(),
                    stored(bar.open),
                    stored(bar.high),
                    stored(bar.low),
                    stored(bar.close),
                    stored(bar.volume)
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }
}

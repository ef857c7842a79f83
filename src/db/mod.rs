//! Persistent license cache.
//!
//! One write connection behind a mutex and a small r2d2 pool for lookups, so
//! several fetch workers can read concurrently while inserts stay serialized.

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod migrations;

const POOL_SIZE: u32 = 4;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseSource {
    Search,
    Api,
}

impl LicenseSource {
    fn as_str(self) -> &'static str {
        match self {
            LicenseSource::Search => "search",
            LicenseSource::Api => "api",
        }
    }
}

/// A cached lookup. `license_key == None` is a remembered negative result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLicense {
    pub license_key: Option<String>,
    pub fetched_at: i64,
}

#[derive(Clone)]
pub struct LicenseCache {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl LicenseCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create cache directory {}", parent.display()))?;
        }

        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        migrations::migrate(&write_conn)?;
        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(POOL_SIZE)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create license cache pool")?;

        tracing::debug!(path = %db_path.display(), "license cache opened");
        Ok(Self {
            write_conn,
            read_pool,
        })
    }

    pub fn get(&self, full_name: &str) -> Result<Option<CachedLicense>> {
        let conn = self.read_pool.get().context("acquire cache connection")?;
        let row = conn
            .query_row(
                "SELECT license_key, fetched_at FROM licenses WHERE full_name = ?",
                [full_name.to_lowercase()],
                |row| {
                    Ok(CachedLicense {
                        license_key: row.get(0)?,
                        fetched_at: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn put(&self, full_name: &str, license_key: Option<&str>, source: LicenseSource) -> Result<()> {
        let conn = self
            .write_conn
            .lock()
            .map_err(|_| anyhow::anyhow!("license cache lock poisoned"))?;
        conn.execute(
            "INSERT INTO licenses (full_name, license_key, fetched_at, source) VALUES (?, ?, ?, ?)
             ON CONFLICT(full_name) DO UPDATE SET
                license_key = excluded.license_key,
                fetched_at = excluded.fetched_at,
                source = excluded.source",
            params![
                full_name.to_lowercase(),
                license_key,
                chrono::Utc::now().timestamp(),
                source.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.read_pool.get().context("acquire cache connection")?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- source: where the key came from, the search payload or the license endpoint.
        CREATE TABLE IF NOT EXISTS licenses (
            full_name TEXT PRIMARY KEY,
            license_key TEXT,
            fetched_at INTEGER NOT NULL,
            source TEXT NOT NULL DEFAULT 'api'
        );
        COMMIT;
        ",
    )?;

    let existing = schema_version(conn)?;
    if existing < SCHEMA_VERSION {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    Ok(version)
}

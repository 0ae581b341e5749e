use rusqlite::Connection;

use crate::error::Result;

/// Initialise the workers and jobs tables.
///
/// Safe to call on every startup: uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS workers (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            phone       TEXT NOT NULL UNIQUE,
            email       TEXT,
            nationality TEXT,
            skill       TEXT NOT NULL,
            location    TEXT,
            status      TEXT NOT NULL DEFAULT 'available',
            documents   TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workers_updated
            ON workers(updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_workers_skill_status
            ON workers(skill COLLATE NOCASE, status);

        CREATE TABLE IF NOT EXISTS jobs (
            id                 TEXT PRIMARY KEY,
            business_id        TEXT NOT NULL,
            title              TEXT NOT NULL,
            category           TEXT NOT NULL,
            description        TEXT,
            status             TEXT NOT NULL DEFAULT 'pending',
            assigned_worker_id TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_updated
            ON jobs(updated_at DESC);",
    )?;
    Ok(())
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the notifications table. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            target_kind TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            kind        TEXT NOT NULL,
            payload     TEXT NOT NULL,
            message     TEXT NOT NULL,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_target
            ON notifications(target_kind, target_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_notifications_kind
            ON notifications(kind);",
    )?;
    Ok(())
}

use rusqlite::Connection;

use crate::error::Result;

/// Initialise the habit store schema in `conn`.
///
/// Idempotent. Reminder hour/minute are nullable and unchecked here; the
/// both-or-neither rule is enforced when a habit is evaluated, not stored.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS recipients (
            id            TEXT    NOT NULL PRIMARY KEY,
            display_name  TEXT,
            push_token    TEXT,               -- NULL until the device registers
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS habits (
            id                      TEXT    NOT NULL,
            recipient_id            TEXT    NOT NULL REFERENCES recipients(id),
            name                    TEXT    NOT NULL,
            reminder_hour           INTEGER,
            reminder_minute         INTEGER,
            streak                  INTEGER NOT NULL DEFAULT 0,
            notification_scheduled  INTEGER NOT NULL DEFAULT 0,
            scheduled_time          TEXT,       -- 'HH:MM' written by the dispatcher
            created_at              TEXT    NOT NULL,
            updated_at              TEXT    NOT NULL,
            PRIMARY KEY (recipient_id, id)
        ) STRICT;
        ",
    )?;
    Ok(())
}

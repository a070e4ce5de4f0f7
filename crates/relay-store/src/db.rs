use rusqlite::Connection;

use crate::error::Result;

/// Initialise the message schema in `conn`. Safe to call on every startup.
///
/// Uniqueness of `(channel, message_ts)` is not enforced here; the pager's
/// monotonic cursor guarantees it.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            channel     TEXT    NOT NULL,
            message_ts  REAL    NOT NULL,
            message     TEXT    NOT NULL,   -- raw JSON envelope
            relay_state TEXT    NOT NULL DEFAULT 'pending',
            created_at  TEXT    NOT NULL,
            relayed_at  TEXT                -- ISO-8601 or NULL
        );

        -- Cursor lookup: latest timestamp per channel
        CREATE INDEX IF NOT EXISTS idx_messages_channel_ts
            ON messages (channel, message_ts);

        -- Backlog sweep: pending rows per channel in timestamp order
        CREATE INDEX IF NOT EXISTS idx_messages_pending
            ON messages (channel, relay_state, message_ts);
        ",
    )?;
    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            user_id         INTEGER PRIMARY KEY,
            vip_expires_at  TEXT,
            last_used_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS request_quotas (
            user_id          INTEGER PRIMARY KEY,
            last_request_at  TEXT NOT NULL,
            remaining        INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS verification_jobs (
            id           TEXT PRIMARY KEY,
            code         TEXT NOT NULL UNIQUE,
            user_id      INTEGER NOT NULL,
            uid          TEXT NOT NULL,
            region       TEXT NOT NULL,
            verified     INTEGER NOT NULL DEFAULT 0,
            verified_at  TEXT,
            processed    INTEGER NOT NULL DEFAULT 0,
            expires_at   TEXT NOT NULL,
            chat_id      INTEGER NOT NULL,
            message_id   INTEGER NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_pending
            ON verification_jobs(verified, processed, created_at);

        CREATE INDEX IF NOT EXISTS idx_jobs_user
            ON verification_jobs(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id               TEXT PRIMARY KEY,
            username         TEXT NOT NULL UNIQUE,
            email            TEXT NOT NULL UNIQUE,
            full_name        TEXT NOT NULL,
            avatar_url       TEXT NOT NULL,
            cover_image_url  TEXT,
            password_hash    TEXT NOT NULL,
            refresh_token    TEXT,
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_users_full_name
            ON users(full_name);

        -- owner_id carries no FOREIGN KEY: ownership is resolved by lookup,
        -- never enforced by the storage layer.
        CREATE TABLE IF NOT EXISTS videos (
            id             TEXT PRIMARY KEY,
            media_url      TEXT NOT NULL,
            thumbnail_url  TEXT NOT NULL,
            title          TEXT NOT NULL,
            description    TEXT NOT NULL,
            duration_secs  REAL NOT NULL,
            views          INTEGER NOT NULL DEFAULT 0,
            is_published   INTEGER NOT NULL DEFAULT 1,
            owner_id       TEXT NOT NULL,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_videos_owner
            ON videos(owner_id);

        -- Ordered append-only list of weak video references per user.
        CREATE TABLE IF NOT EXISTS watch_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL REFERENCES users(id),
            video_id    TEXT NOT NULL,
            watched_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_watch_history_user
            ON watch_history(user_id, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

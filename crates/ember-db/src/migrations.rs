use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            age             INTEGER NOT NULL,
            gender          TEXT NOT NULL,
            bio             TEXT NOT NULL DEFAULT '',
            photos          TEXT NOT NULL DEFAULT '[]',
            interested_in   TEXT NOT NULL DEFAULT '[]',
            age_min         INTEGER NOT NULL DEFAULT 18,
            age_max         INTEGER NOT NULL DEFAULT 100,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS likes (
            user_id     TEXT NOT NULL REFERENCES users(id),
            target_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, target_id)
        );

        CREATE TABLE IF NOT EXISTS dislikes (
            user_id     TEXT NOT NULL REFERENCES users(id),
            target_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, target_id)
        );

        -- pair_key is the canonical unordered pair key; its UNIQUE constraint
        -- is what makes match formation at-most-once per pair under
        -- concurrent mutual likes.
        CREATE TABLE IF NOT EXISTS matches (
            id                      TEXT PRIMARY KEY,
            pair_key                TEXT NOT NULL UNIQUE,
            user_a                  TEXT NOT NULL REFERENCES users(id),
            user_b                  TEXT NOT NULL REFERENCES users(id),
            matched_at              TEXT NOT NULL,
            is_active               INTEGER NOT NULL DEFAULT 1,
            last_message_content    TEXT,
            last_message_sender     TEXT,
            last_message_at         TEXT,
            CHECK (user_a <> user_b)
        );

        -- Per-user match sets. Rows exist in both directions for exactly the
        -- active matches; written and cleared in the same transaction as the
        -- matches row they mirror.
        CREATE TABLE IF NOT EXISTS matched (
            user_id     TEXT NOT NULL REFERENCES users(id),
            other_id    TEXT NOT NULL REFERENCES users(id),
            match_id    TEXT NOT NULL REFERENCES matches(id),
            PRIMARY KEY (user_id, other_id)
        );

        CREATE INDEX IF NOT EXISTS idx_matched_match
            ON matched(match_id);

        -- seq is assigned MAX+1 inside the append transaction, so log order
        -- equals append order and breaks equal-timestamp ties.
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            match_id    TEXT NOT NULL REFERENCES matches(id),
            seq         INTEGER NOT NULL,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            sent_at     TEXT NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0,
            UNIQUE (match_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_match
            ON messages(match_id, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            credits     INTEGER NOT NULL DEFAULT 500 CHECK (credits >= 0),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memes (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            image_url   TEXT NOT NULL,
            tags        TEXT NOT NULL DEFAULT '[]',
            caption     TEXT NOT NULL,
            vibe        TEXT NOT NULL,
            upvotes     INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
            downvotes   INTEGER NOT NULL DEFAULT 0 CHECK (downvotes >= 0),
            user_id     TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_memes_created
            ON memes(created_at);

        CREATE INDEX IF NOT EXISTS idx_memes_user
            ON memes(user_id);

        CREATE TABLE IF NOT EXISTS bids (
            id          TEXT PRIMARY KEY,
            meme_id     TEXT NOT NULL REFERENCES memes(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            amount      INTEGER NOT NULL CHECK (amount > 0),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(meme_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_bids_meme_amount
            ON bids(meme_id, amount DESC);

        CREATE INDEX IF NOT EXISTS idx_bids_user
            ON bids(user_id, created_at);

        CREATE TABLE IF NOT EXISTS votes (
            id          TEXT PRIMARY KEY,
            meme_id     TEXT NOT NULL REFERENCES memes(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            vote_type   TEXT NOT NULL CHECK (vote_type IN ('up', 'down')),
            created_at  TEXT NOT NULL,
            UNIQUE(meme_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_user
            ON votes(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

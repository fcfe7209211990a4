use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use hustle_types::models::{Meme, STARTING_CREDITS, User};

use crate::models::{
    MEME_COLUMNS, MEME_FROM, MemePatch, NewMeme, USER_COLUMNS, UserRow, encode_tags,
    meme_from_row, timestamp_at, user_from_row, uuid_at,
};
use crate::{Database, now_ts};

impl Database {
    // -- Users --

    /// Insert a user with the starting balance.
    /// Returns `None` if the email is already registered.
    pub fn create_user(
        &self,
        id: Uuid,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, credits, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![
                    id.to_string(),
                    name,
                    email,
                    password_hash,
                    STARTING_CREDITS,
                    now_ts()
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_user(conn, &id.to_string())?
                .map(Some)
                .ok_or_else(|| anyhow!("User vanished after insert: {}", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| Ok(query_user(conn, &id.to_string())?))
    }

    /// Overwrite a balance. Returns the updated user, or `None` if absent.
    pub fn set_credits(&self, id: Uuid, credits: i64) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let id = id.to_string();
            let changed = conn.execute(
                "UPDATE users SET credits = ?1 WHERE id = ?2",
                rusqlite::params![credits, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Ok(query_user(conn, &id)?)
        })
    }

    // -- Memes --

    pub fn insert_meme(&self, meme: &NewMeme) -> Result<Meme> {
        let tags = encode_tags(&meme.tags)?;
        self.with_conn(|conn| {
            let id = meme.id.to_string();
            conn.execute(
                "INSERT INTO memes (id, title, image_url, tags, caption, vibe, upvotes, downvotes, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?8)",
                rusqlite::params![
                    id,
                    meme.title,
                    meme.image_url,
                    tags,
                    meme.caption,
                    meme.vibe,
                    meme.user_id.to_string(),
                    now_ts()
                ],
            )?;
            query_meme(conn, &id)?.ok_or_else(|| anyhow!("Meme vanished after insert: {}", id))
        })
    }

    /// All memes, newest first.
    pub fn list_memes(&self) -> Result<Vec<Meme>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEME_COLUMNS} {MEME_FROM} ORDER BY m.created_at DESC, m.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| meme_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_meme(&self, id: Uuid) -> Result<Option<Meme>> {
        self.with_conn(|conn| Ok(query_meme(conn, &id.to_string())?))
    }

    /// Apply a partial update. Returns `None` if the meme does not exist.
    pub fn update_meme(&self, id: Uuid, patch: &MemePatch) -> Result<Option<Meme>> {
        let tags = patch.tags.as_deref().map(encode_tags).transpose()?;
        self.with_conn(|conn| {
            let id = id.to_string();
            let changed = conn.execute(
                "UPDATE memes SET
                    title     = COALESCE(?1, title),
                    image_url = COALESCE(?2, image_url),
                    tags      = COALESCE(?3, tags),
                    caption   = COALESCE(?4, caption),
                    vibe      = COALESCE(?5, vibe)
                 WHERE id = ?6",
                rusqlite::params![
                    patch.title,
                    patch.image_url,
                    tags,
                    patch.caption,
                    patch.vibe,
                    id
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Ok(query_meme(conn, &id)?)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, credits, created_at, password FROM users WHERE email = ?1",
    )?;

    let row = stmt
        .query_row([email], |row| {
            Ok(UserRow {
                user: User {
                    id: uuid_at(row, 0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    credits: row.get(3)?,
                    created_at: timestamp_at(row, 4)?,
                },
                password_hash: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_meme(conn: &Connection, id: &str) -> rusqlite::Result<Option<Meme>> {
    let sql = format!("SELECT {MEME_COLUMNS} {MEME_FROM} WHERE m.id = ?1");
    conn.query_row(&sql, [id], |row| meme_from_row(row, 0))
        .optional()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn user(db: &Database, name: &str) -> User {
        db.create_user(
            Uuid::new_v4(),
            name,
            &format!("{}@example.com", name),
            "not-a-real-hash",
        )
        .unwrap()
        .unwrap()
    }

    pub fn meme(db: &Database, owner: &User, title: &str) -> Meme {
        db.insert_meme(&NewMeme {
            id: Uuid::new_v4(),
            title: title.to_string(),
            image_url: "https://picsum.photos/400/300".into(),
            tags: vec!["funny".into(), "test".into()],
            caption: "It just works".into(),
            vibe: "Meme Vibes".into(),
            user_id: owner.id,
        })
        .unwrap()
    }
}

//! Row types and column mapping. Ids and timestamps are TEXT in SQLite and
//! are parsed back into typed values here, so the rest of the crate hands out
//! `hustle-types` models directly.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use hustle_types::models::{Bid, Meme, MemeSummary, User, VoteType};

/// A user together with the stored password hash. Only auth needs the hash.
pub struct UserRow {
    pub user: User,
    pub password_hash: String,
}

pub struct NewMeme {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    pub tags: Vec<String>,
    pub caption: String,
    pub vibe: String,
    pub user_id: Uuid,
}

/// Partial meme update; `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct MemePatch {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub caption: Option<String>,
    pub vibe: Option<String>,
}

pub(crate) const USER_COLUMNS: &str = "id, name, email, credits, created_at";

pub(crate) const MEME_COLUMNS: &str = "m.id, m.title, m.image_url, m.tags, m.caption, m.vibe, \
     m.upvotes, m.downvotes, m.user_id, COALESCE(u.name, 'Anonymous'), m.created_at";

/// Number of columns produced by `MEME_COLUMNS`.
pub(crate) const MEME_WIDTH: usize = 11;

pub(crate) const MEME_FROM: &str = "FROM memes m LEFT JOIN users u ON u.id = m.user_id";

pub(crate) const BID_COLUMNS: &str =
    "b.id, b.meme_id, b.user_id, COALESCE(u.name, 'Anonymous'), b.amount, b.created_at, b.updated_at";

pub(crate) const BID_WIDTH: usize = 7;

pub(crate) const BID_FROM: &str = "FROM bids b LEFT JOIN users u ON u.id = b.user_id";

pub(crate) const SUMMARY_COLUMNS: &str = "s.id, s.title, s.image_url, s.caption, s.vibe";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn vote_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<VoteType> {
    let raw: String = row.get(idx)?;
    raw.parse::<VoteType>()
        .map_err(|e| conversion_error(idx, std::io::Error::other(e)))
}

fn tags_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn encode_tags(tags: &[String]) -> anyhow::Result<String> {
    Ok(serde_json::to_string(tags)?)
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        credits: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

/// Map `MEME_COLUMNS` starting at column `base`.
pub(crate) fn meme_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Meme> {
    Ok(Meme {
        id: uuid_at(row, base)?,
        title: row.get(base + 1)?,
        image_url: row.get(base + 2)?,
        tags: tags_at(row, base + 3)?,
        caption: row.get(base + 4)?,
        vibe: row.get(base + 5)?,
        upvotes: row.get(base + 6)?,
        downvotes: row.get(base + 7)?,
        user_id: uuid_at(row, base + 8)?,
        user_name: row.get(base + 9)?,
        created_at: timestamp_at(row, base + 10)?,
    })
}

/// Map `BID_COLUMNS` starting at column `base`.
pub(crate) fn bid_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Bid> {
    Ok(Bid {
        id: uuid_at(row, base)?,
        meme_id: uuid_at(row, base + 1)?,
        user_id: uuid_at(row, base + 2)?,
        user_name: row.get(base + 3)?,
        amount: row.get(base + 4)?,
        created_at: timestamp_at(row, base + 5)?,
        updated_at: timestamp_at(row, base + 6)?,
    })
}

/// Map `SUMMARY_COLUMNS` from a LEFT JOIN; a missing meme yields `None`.
pub(crate) fn summary_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<Option<MemeSummary>> {
    let id: Option<String> = row.get(base)?;
    if id.is_none() {
        return Ok(None);
    }
    Ok(Some(MemeSummary {
        id: uuid_at(row, base)?,
        title: row.get(base + 1)?,
        image_url: row.get(base + 2)?,
        caption: row.get(base + 3)?,
        vibe: row.get(base + 4)?,
    }))
}

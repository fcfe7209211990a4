//! Read-only ranked views over memes, bids and users.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use hustle_types::models::{Meme, RankedMeme, UserStanding};

use crate::Database;
use crate::models::{MEME_COLUMNS, MEME_FROM, MEME_WIDTH, meme_from_row, timestamp_at, uuid_at};

/// Memes plus one optional integer metric column, in query order.
fn memes_with_metric(
    conn: &Connection,
    metric: &str,
    tail: &str,
    limit: Option<u32>,
) -> Result<Vec<(Meme, i64)>> {
    let mut sql = format!("SELECT {MEME_COLUMNS}, {metric} {MEME_FROM} {tail}");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((meme_from_row(row, 0)?, row.get::<_, i64>(MEME_WIDTH)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

const BID_COUNT: &str = "(SELECT COUNT(*) FROM bids b WHERE b.meme_id = m.id)";
const MAX_BID: &str = "(SELECT MAX(b.amount) FROM bids b WHERE b.meme_id = m.id)";

impl Database {
    /// Memes by upvotes, descending.
    pub fn trending(&self, limit: u32) -> Result<Vec<RankedMeme>> {
        self.with_conn(|conn| {
            let rows = memes_with_metric(
                conn,
                "m.upvotes",
                "ORDER BY m.upvotes DESC, m.created_at DESC",
                Some(limit),
            )?;
            Ok(rows.into_iter().map(|(meme, _)| RankedMeme::plain(meme)).collect())
        })
    }

    /// Memes by creation time, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<RankedMeme>> {
        self.with_conn(|conn| {
            let rows = memes_with_metric(
                conn,
                "0",
                "ORDER BY m.created_at DESC, m.rowid DESC",
                Some(limit),
            )?;
            Ok(rows.into_iter().map(|(meme, _)| RankedMeme::plain(meme)).collect())
        })
    }

    /// Memes by number of bids, descending.
    pub fn most_bid(&self, limit: u32) -> Result<Vec<RankedMeme>> {
        self.with_conn(|conn| {
            let rows = memes_with_metric(
                conn,
                BID_COUNT,
                "ORDER BY 12 DESC, m.created_at DESC",
                Some(limit),
            )?;
            Ok(rows
                .into_iter()
                .map(|(meme, count)| RankedMeme {
                    bid_count: Some(count),
                    ..RankedMeme::plain(meme)
                })
                .collect())
        })
    }

    /// Memes that have at least one bid, by their top bid, descending.
    pub fn highest_bids(&self, limit: u32) -> Result<Vec<RankedMeme>> {
        self.with_conn(|conn| {
            let rows = memes_with_metric(
                conn,
                MAX_BID,
                "WHERE EXISTS (SELECT 1 FROM bids b WHERE b.meme_id = m.id)
                 ORDER BY 12 DESC, m.created_at DESC",
                Some(limit),
            )?;
            Ok(rows
                .into_iter()
                .map(|(meme, top)| RankedMeme {
                    highest_bid: Some(top),
                    ..RankedMeme::plain(meme)
                })
                .collect())
        })
    }

    /// Composite ranking: upvotes plus bid count, scored here rather than in
    /// SQL so the formula lives in one place.
    pub fn overall(&self, limit: u32) -> Result<Vec<RankedMeme>> {
        let rows = self.with_conn(|conn| memes_with_metric(conn, BID_COUNT, "", None))?;

        let mut ranked: Vec<RankedMeme> = rows
            .into_iter()
            .map(|(meme, bid_count)| RankedMeme {
                score: Some(overall_score(&meme, bid_count)),
                bid_count: Some(bid_count),
                ..RankedMeme::plain(meme)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.meme.created_at.cmp(&a.meme.created_at))
        });
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    /// Users by number of memes posted, then by upvotes collected on them.
    pub fn top_users(&self, limit: u32) -> Result<Vec<UserStanding>> {
        let (users, memes) = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, created_at FROM users")?;
            let users = stmt
                .query_map([], |row| {
                    Ok(UserStanding {
                        id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                        created_at: timestamp_at(row, 2)?,
                        meme_count: 0,
                        total_upvotes: 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare("SELECT user_id, upvotes FROM memes")?;
            let memes = stmt
                .query_map([], |row| Ok((uuid_at(row, 0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((users, memes))
        })?;

        let mut totals: HashMap<Uuid, (i64, i64)> = HashMap::new();
        for (owner, upvotes) in memes {
            let entry = totals.entry(owner).or_default();
            entry.0 += 1;
            entry.1 += upvotes;
        }

        let mut standings: Vec<UserStanding> = users
            .into_iter()
            .map(|mut standing| {
                if let Some(&(count, upvotes)) = totals.get(&standing.id) {
                    standing.meme_count = count;
                    standing.total_upvotes = upvotes;
                }
                standing
            })
            .collect();

        standings.sort_by(|a, b| {
            b.meme_count
                .cmp(&a.meme_count)
                .then_with(|| b.total_upvotes.cmp(&a.total_upvotes))
                .then_with(|| a.name.cmp(&b.name))
        });
        standings.truncate(limit as usize);
        Ok(standings)
    }
}

pub fn overall_score(meme: &Meme, bid_count: i64) -> i64 {
    meme.upvotes + bid_count
}

//! Vote tally: at most one vote per (meme, user) with toggle semantics, and
//! denormalized up/down counters on the meme row.

use anyhow::Result;
use rusqlite::OptionalExtension;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use hustle_types::models::{Meme, UserVote, Vote, VoteAction, VoteCounts, VoteType};

use crate::models::{SUMMARY_COLUMNS, summary_from_row, timestamp_at, uuid_at, vote_type_at};
use crate::queries::query_meme;
use crate::{Database, now_ts};

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("Meme not found")]
    MemeNotFound,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for TallyError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub meme: Meme,
    pub vote_type: VoteType,
    pub action: VoteAction,
}

/// Apply one vote of type `cast` to a user's `prior` vote.
///
/// Returns the user's vote afterwards, the new counters and what happened.
/// Decrements saturate at zero.
pub fn transition(
    prior: Option<VoteType>,
    cast: VoteType,
    counts: VoteCounts,
) -> (Option<VoteType>, VoteCounts, VoteAction) {
    let mut counts = counts;

    let (after, action) = match prior {
        None => {
            bump(&mut counts, cast, 1);
            (Some(cast), VoteAction::Added)
        }
        Some(existing) if existing == cast => {
            bump(&mut counts, cast, -1);
            (None, VoteAction::Removed)
        }
        Some(existing) => {
            bump(&mut counts, existing, -1);
            bump(&mut counts, cast, 1);
            (Some(cast), VoteAction::Changed)
        }
    };

    (after, counts, action)
}

fn bump(counts: &mut VoteCounts, kind: VoteType, delta: i64) {
    let slot = match kind {
        VoteType::Up => &mut counts.upvotes,
        VoteType::Down => &mut counts.downvotes,
    };
    *slot = (*slot + delta).max(0);
}

impl Database {
    /// Toggle the caller's vote on a meme and persist the new counters.
    pub fn cast_vote(
        &self,
        meme_id: Uuid,
        user_id: Uuid,
        vote_type: VoteType,
    ) -> std::result::Result<VoteOutcome, TallyError> {
        let meme_key = meme_id.to_string();
        let user_key = user_id.to_string();

        self.transaction(|tx| {
            let counts = tx
                .query_row(
                    "SELECT upvotes, downvotes FROM memes WHERE id = ?1",
                    [&meme_key],
                    |row| {
                        Ok(VoteCounts {
                            upvotes: row.get(0)?,
                            downvotes: row.get(1)?,
                        })
                    },
                )
                .optional()?
                .ok_or(TallyError::MemeNotFound)?;

            let existing: Option<(String, VoteType)> = tx
                .query_row(
                    "SELECT id, vote_type FROM votes WHERE meme_id = ?1 AND user_id = ?2",
                    [&meme_key, &user_key],
                    |row| Ok((row.get(0)?, vote_type_at(row, 1)?)),
                )
                .optional()?;

            let prior = existing.as_ref().map(|(_, kind)| *kind);
            let (after, counts, action) = transition(prior, vote_type, counts);

            match (existing, after) {
                (None, Some(kind)) => {
                    tx.execute(
                        "INSERT INTO votes (id, meme_id, user_id, vote_type, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            Uuid::new_v4().to_string(),
                            meme_key,
                            user_key,
                            kind.as_str(),
                            now_ts()
                        ],
                    )?;
                }
                (Some((id, _)), None) => {
                    tx.execute("DELETE FROM votes WHERE id = ?1", [&id])?;
                }
                (Some((id, _)), Some(kind)) => {
                    tx.execute(
                        "UPDATE votes SET vote_type = ?1 WHERE id = ?2",
                        rusqlite::params![kind.as_str(), id],
                    )?;
                }
                (None, None) => {}
            }

            tx.execute(
                "UPDATE memes SET upvotes = ?1, downvotes = ?2 WHERE id = ?3",
                rusqlite::params![counts.upvotes, counts.downvotes, meme_key],
            )?;

            let meme = query_meme(tx, &meme_key)?.ok_or(TallyError::MemeNotFound)?;

            Ok(VoteOutcome {
                meme,
                vote_type,
                action,
            })
        })
    }

    /// Counters straight from the meme row.
    pub fn vote_counts(&self, meme_id: Uuid) -> Result<Option<VoteCounts>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT upvotes, downvotes FROM memes WHERE id = ?1",
                    [meme_id.to_string()],
                    |row| {
                        Ok(VoteCounts {
                            upvotes: row.get(0)?,
                            downvotes: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn user_vote(&self, meme_id: Uuid, user_id: Uuid) -> Result<Option<VoteType>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT vote_type FROM votes WHERE meme_id = ?1 AND user_id = ?2",
                    [meme_id.to_string(), user_id.to_string()],
                    |row| vote_type_at(row, 0),
                )
                .optional()?)
        })
    }

    /// The caller's voting history, newest first.
    pub fn votes_for_user(&self, user_id: Uuid) -> Result<Vec<UserVote>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT v.id, v.meme_id, v.user_id, v.vote_type, v.created_at, {SUMMARY_COLUMNS}
                 FROM votes v
                 LEFT JOIN memes s ON s.id = v.meme_id
                 WHERE v.user_id = ?1
                 ORDER BY v.created_at DESC, v.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(UserVote {
                        vote: Vote {
                            id: uuid_at(row, 0)?,
                            meme_id: uuid_at(row, 1)?,
                            user_id: uuid_at(row, 2)?,
                            vote_type: vote_type_at(row, 3)?,
                            created_at: timestamp_at(row, 4)?,
                        },
                        meme: summary_from_row(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Rebuild every meme's counters from its vote rows.
    /// Returns how many memes had drifted.
    pub fn reconcile_vote_counts(&self) -> Result<usize> {
        self.transaction(|tx| {
            let fixed = tx.execute(
                "UPDATE memes SET
                    upvotes   = (SELECT COUNT(*) FROM votes v WHERE v.meme_id = memes.id AND v.vote_type = 'up'),
                    downvotes = (SELECT COUNT(*) FROM votes v WHERE v.meme_id = memes.id AND v.vote_type = 'down')
                 WHERE upvotes   != (SELECT COUNT(*) FROM votes v WHERE v.meme_id = memes.id AND v.vote_type = 'up')
                    OR downvotes != (SELECT COUNT(*) FROM votes v WHERE v.meme_id = memes.id AND v.vote_type = 'down')",
                [],
            )?;
            if fixed > 0 {
                info!("Reconciled vote counters on {} memes", fixed);
            }
            Ok(fixed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{meme, user};

    const ZERO: VoteCounts = VoteCounts { upvotes: 0, downvotes: 0 };

    fn counts(up: i64, down: i64) -> VoteCounts {
        VoteCounts { upvotes: up, downvotes: down }
    }

    #[test]
    fn transition_table() {
        use VoteAction::*;
        use VoteType::*;

        assert_eq!(transition(None, Up, ZERO), (Some(Up), counts(1, 0), Added));
        assert_eq!(transition(None, Down, ZERO), (Some(Down), counts(0, 1), Added));
        assert_eq!(transition(Some(Up), Up, counts(1, 0)), (None, ZERO, Removed));
        assert_eq!(transition(Some(Down), Down, counts(0, 1)), (None, ZERO, Removed));
        assert_eq!(transition(Some(Up), Down, counts(1, 0)), (Some(Down), counts(0, 1), Changed));
        assert_eq!(transition(Some(Down), Up, counts(0, 1)), (Some(Up), counts(1, 0), Changed));
    }

    #[test]
    fn decrements_saturate_at_zero() {
        let (_, after, _) = transition(Some(VoteType::Up), VoteType::Up, ZERO);
        assert_eq!(after, ZERO);

        let (_, after, _) = transition(Some(VoteType::Down), VoteType::Up, ZERO);
        assert_eq!(after, counts(1, 0));
    }

    #[test]
    fn voting_up_twice_is_a_no_op() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        let first = db.cast_vote(m.id, a.id, VoteType::Up).unwrap();
        assert_eq!(first.action, VoteAction::Added);
        assert_eq!(first.meme.upvotes, 1);

        let second = db.cast_vote(m.id, a.id, VoteType::Up).unwrap();
        assert_eq!(second.action, VoteAction::Removed);
        assert_eq!(db.vote_counts(m.id).unwrap().unwrap(), ZERO);
        assert_eq!(db.user_vote(m.id, a.id).unwrap(), None);
    }

    #[test]
    fn flipping_moves_the_vote_between_counters() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        db.cast_vote(m.id, a.id, VoteType::Up).unwrap();
        let flipped = db.cast_vote(m.id, a.id, VoteType::Down).unwrap();

        assert_eq!(flipped.action, VoteAction::Changed);
        assert_eq!((flipped.meme.upvotes, flipped.meme.downvotes), (0, 1));
        assert_eq!(db.user_vote(m.id, a.id).unwrap(), Some(VoteType::Down));
    }

    #[test]
    fn voting_on_missing_meme_fails() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        assert!(matches!(
            db.cast_vote(Uuid::new_v4(), a.id, VoteType::Up),
            Err(TallyError::MemeNotFound)
        ));
    }

    #[test]
    fn votes_from_many_users_accumulate() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let m = meme(&db, &owner, "m");

        for i in 0..3 {
            let u = user(&db, &format!("up{}", i));
            db.cast_vote(m.id, u.id, VoteType::Up).unwrap();
        }
        let d = user(&db, "down");
        db.cast_vote(m.id, d.id, VoteType::Down).unwrap();

        assert_eq!(db.vote_counts(m.id).unwrap().unwrap(), counts(3, 1));

        let history = db.votes_for_user(d.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].vote.vote_type, VoteType::Down);
        assert_eq!(history[0].meme.as_ref().unwrap().id, m.id);
    }

    #[test]
    fn reconcile_rebuilds_drifted_counters() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");
        db.cast_vote(m.id, a.id, VoteType::Up).unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE memes SET upvotes = 7, downvotes = 2 WHERE id = ?1",
                [m.id.to_string()],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.reconcile_vote_counts().unwrap(), 1);
        assert_eq!(db.vote_counts(m.id).unwrap().unwrap(), counts(1, 0));
        assert_eq!(db.reconcile_vote_counts().unwrap(), 0);
    }
}

//! Bid ledger: credit-backed bids, one per (meme, user).
//!
//! Every settlement runs in a single IMMEDIATE transaction. The highest-bid
//! check and the write it guards cannot interleave with another placement,
//! and balances only move through conditional in-place updates.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use hustle_types::models::{Bid, UserBid};

use crate::models::{BID_COLUMNS, BID_FROM, BID_WIDTH, SUMMARY_COLUMNS, bid_from_row, summary_from_row};
use crate::{Database, now_ts};

/// Refunds saturate at `i64::MAX`; SQLite would otherwise overflow into REAL.
const REFUND_SQL: &str = "UPDATE users
     SET credits = CASE WHEN credits > 9223372036854775807 - ?1 THEN 9223372036854775807
                        ELSE credits + ?1 END
     WHERE id = ?2";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid bid amount")]
    InvalidAmount,

    #[error("User not found")]
    UserNotFound,

    #[error("Meme not found")]
    MemeNotFound,

    #[error("Insufficient credits")]
    InsufficientCredits { balance: i64, amount: i64 },

    #[error("Bid must be higher than current highest bid")]
    BidTooLow { highest: i64 },

    #[error("Bid not found or not authorized")]
    BidNotFound,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

#[derive(Debug, Clone)]
pub struct BidPlacement {
    pub bid: Bid,
    pub remaining_credits: i64,
    /// True when an existing bid by the same user was raised in place.
    pub replaced: bool,
}

#[derive(Debug, Clone)]
pub struct BidCancellation {
    pub bid_id: Uuid,
    pub meme_id: Uuid,
    pub refunded: i64,
    pub remaining_credits: i64,
}

/// Credits returned to a bidder when the meme they bid on is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub user_id: Uuid,
    pub amount: i64,
    pub credits: i64,
}

impl Database {
    /// Place or raise the caller's bid on a meme and debit `amount`.
    pub fn place_bid(
        &self,
        meme_id: Uuid,
        user_id: Uuid,
        amount: i64,
    ) -> std::result::Result<BidPlacement, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let meme_id = meme_id.to_string();
        let user_id = user_id.to_string();

        self.transaction(|tx| {
            let balance = query_credits(tx, &user_id)?.ok_or(LedgerError::UserNotFound)?;

            let meme_exists = tx
                .query_row("SELECT 1 FROM memes WHERE id = ?1", [&meme_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !meme_exists {
                return Err(LedgerError::MemeNotFound);
            }

            if balance < amount {
                return Err(LedgerError::InsufficientCredits { balance, amount });
            }

            let highest: i64 = tx.query_row(
                "SELECT COALESCE(MAX(amount), 0) FROM bids WHERE meme_id = ?1",
                [&meme_id],
                |row| row.get(0),
            )?;
            if amount <= highest {
                return Err(LedgerError::BidTooLow { highest });
            }

            let now = now_ts();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM bids WHERE meme_id = ?1 AND user_id = ?2",
                    [&meme_id, &user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let replaced = existing.is_some();
            let bid_id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE bids SET amount = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![amount, now, id],
                    )?;
                    id
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO bids (id, meme_id, user_id, amount, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                        rusqlite::params![id, meme_id, user_id, amount, now],
                    )?;
                    id
                }
            };

            let debited = tx.execute(
                "UPDATE users SET credits = credits - ?1 WHERE id = ?2 AND credits >= ?1",
                rusqlite::params![amount, user_id],
            )?;
            if debited == 0 {
                return Err(LedgerError::InsufficientCredits { balance, amount });
            }

            let remaining_credits = query_credits(tx, &user_id)?.ok_or(LedgerError::UserNotFound)?;
            let bid = query_bid(tx, &bid_id)?
                .ok_or_else(|| anyhow::anyhow!("Bid vanished after write: {}", bid_id))?;

            debug!(
                "Bid {} on meme {} by {}: {} credits (replaced={})",
                bid_id, meme_id, user_id, amount, replaced
            );

            Ok(BidPlacement {
                bid,
                remaining_credits,
                replaced,
            })
        })
    }

    /// Withdraw the caller's bid and credit its amount back.
    pub fn cancel_bid(
        &self,
        bid_id: Uuid,
        user_id: Uuid,
    ) -> std::result::Result<BidCancellation, LedgerError> {
        let bid_key = bid_id.to_string();
        let user_key = user_id.to_string();

        self.transaction(|tx| {
            let (meme_id, amount): (String, i64) = tx
                .query_row(
                    "SELECT meme_id, amount FROM bids WHERE id = ?1 AND user_id = ?2",
                    [&bid_key, &user_key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or(LedgerError::BidNotFound)?;

            tx.execute("DELETE FROM bids WHERE id = ?1", [&bid_key])?;

            let credited = tx.execute(REFUND_SQL, rusqlite::params![amount, user_key])?;
            if credited == 0 {
                return Err(LedgerError::UserNotFound);
            }

            let remaining_credits = query_credits(tx, &user_key)?.ok_or(LedgerError::UserNotFound)?;
            let meme_id = Uuid::parse_str(&meme_id).map_err(anyhow::Error::from)?;

            Ok(BidCancellation {
                bid_id,
                meme_id,
                refunded: amount,
                remaining_credits,
            })
        })
    }

    /// Bids on a meme, highest first.
    pub fn bids_for_meme(&self, meme_id: Uuid) -> Result<Vec<Bid>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BID_COLUMNS} {BID_FROM} WHERE b.meme_id = ?1
                 ORDER BY b.amount DESC, b.updated_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([meme_id.to_string()], |row| bid_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn highest_bid(&self, meme_id: Uuid) -> Result<Option<Bid>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BID_COLUMNS} {BID_FROM} WHERE b.meme_id = ?1
                 ORDER BY b.amount DESC LIMIT 1"
            );
            Ok(conn
                .query_row(&sql, [meme_id.to_string()], |row| bid_from_row(row, 0))
                .optional()?)
        })
    }

    /// The caller's bids, newest first, each with the meme it targets.
    pub fn bids_for_user(&self, user_id: Uuid) -> Result<Vec<UserBid>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BID_COLUMNS}, {SUMMARY_COLUMNS} {BID_FROM}
                 LEFT JOIN memes s ON s.id = b.meme_id
                 WHERE b.user_id = ?1
                 ORDER BY b.created_at DESC, b.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(UserBid {
                        bid: bid_from_row(row, 0)?,
                        meme: summary_from_row(row, BID_WIDTH)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a meme with its bids and votes, refunding every outstanding bid.
    /// Returns `None` if the meme does not exist.
    pub fn remove_meme(&self, meme_id: Uuid) -> Result<Option<Vec<Refund>>> {
        let meme_key = meme_id.to_string();

        self.transaction(|tx| {
            let exists = tx
                .query_row("SELECT 1 FROM memes WHERE id = ?1", [&meme_key], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            let outstanding: Vec<(String, i64)> = {
                let mut stmt = tx.prepare("SELECT user_id, amount FROM bids WHERE meme_id = ?1")?;
                let rows = stmt
                    .query_map([&meme_key], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            let mut refunds = Vec::with_capacity(outstanding.len());
            for (user_key, amount) in outstanding {
                tx.execute(REFUND_SQL, rusqlite::params![amount, user_key])?;
                // A bidder row can only be missing if users were removed by hand.
                if let Some(credits) = query_credits(tx, &user_key)? {
                    refunds.push(Refund {
                        user_id: Uuid::parse_str(&user_key)?,
                        amount,
                        credits,
                    });
                }
            }

            tx.execute("DELETE FROM votes WHERE meme_id = ?1", [&meme_key])?;
            tx.execute("DELETE FROM bids WHERE meme_id = ?1", [&meme_key])?;
            tx.execute("DELETE FROM memes WHERE id = ?1", [&meme_key])?;

            Ok(Some(refunds))
        })
    }
}

fn query_credits(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT credits FROM users WHERE id = ?1", [user_id], |row| row.get(0))
        .optional()
}

fn query_bid(conn: &Connection, bid_id: &str) -> rusqlite::Result<Option<Bid>> {
    let sql = format!("SELECT {BID_COLUMNS} {BID_FROM} WHERE b.id = ?1");
    conn.query_row(&sql, [bid_id], |row| bid_from_row(row, 0))
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{meme, user};
    use hustle_types::models::STARTING_CREDITS;

    fn balance(db: &Database, id: Uuid) -> i64 {
        db.get_user(id).unwrap().unwrap().credits
    }

    #[test]
    fn increasing_bids_from_distinct_users_all_succeed() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let m = meme(&db, &owner, "auction");

        for (i, amount) in [10, 20, 35, 80].into_iter().enumerate() {
            let bidder = user(&db, &format!("bidder{}", i));
            let placed = db.place_bid(m.id, bidder.id, amount).unwrap();
            assert!(!placed.replaced);
            assert_eq!(placed.remaining_credits, STARTING_CREDITS - amount);

            let highest = db.highest_bid(m.id).unwrap().unwrap();
            assert_eq!(highest.amount, amount);
            assert_eq!(highest.user_id, bidder.id);
            assert_eq!(highest.user_name, format!("bidder{}", i));
        }
    }

    #[test]
    fn bid_not_above_highest_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let m = meme(&db, &a, "m");

        db.place_bid(m.id, a.id, 100).unwrap();

        for amount in [50, 100] {
            match db.place_bid(m.id, b.id, amount) {
                Err(LedgerError::BidTooLow { highest }) => assert_eq!(highest, 100),
                other => panic!("expected BidTooLow, got {:?}", other),
            }
        }
        assert_eq!(balance(&db, b.id), STARTING_CREDITS);
    }

    #[test]
    fn bid_above_balance_leaves_balance_untouched() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        let err = db.place_bid(m.id, a.id, STARTING_CREDITS + 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCredits { .. }));
        assert_eq!(balance(&db, a.id), STARTING_CREDITS);
        assert!(db.highest_bid(m.id).unwrap().is_none());
    }

    #[test]
    fn non_positive_amounts_and_unknown_memes_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        assert!(matches!(db.place_bid(m.id, a.id, 0), Err(LedgerError::InvalidAmount)));
        assert!(matches!(db.place_bid(m.id, a.id, -5), Err(LedgerError::InvalidAmount)));
        assert!(matches!(
            db.place_bid(Uuid::new_v4(), a.id, 5),
            Err(LedgerError::MemeNotFound)
        ));
    }

    #[test]
    fn rebid_replaces_the_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        let first = db.place_bid(m.id, a.id, 10).unwrap();
        let second = db.place_bid(m.id, a.id, 25).unwrap();
        assert!(second.replaced);
        assert_eq!(first.bid.id, second.bid.id);
        assert_eq!(second.bid.amount, 25);
        // Each placement debits its full amount.
        assert_eq!(second.remaining_credits, STARTING_CREDITS - 10 - 25);

        let bids = db.bids_for_meme(m.id).unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].amount, 25);
    }

    #[test]
    fn cancel_refunds_exactly_the_bid_amount() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        let placed = db.place_bid(m.id, a.id, 120).unwrap();
        let before = balance(&db, a.id);

        let cancelled = db.cancel_bid(placed.bid.id, a.id).unwrap();
        assert_eq!(cancelled.refunded, 120);
        assert_eq!(cancelled.meme_id, m.id);
        assert_eq!(cancelled.remaining_credits, before + 120);
        assert!(db.highest_bid(m.id).unwrap().is_none());

        // Second cancel finds nothing.
        assert!(matches!(
            db.cancel_bid(placed.bid.id, a.id),
            Err(LedgerError::BidNotFound)
        ));
    }

    #[test]
    fn only_the_bidder_can_cancel() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let m = meme(&db, &a, "m");

        let placed = db.place_bid(m.id, a.id, 40).unwrap();
        assert!(matches!(
            db.cancel_bid(placed.bid.id, b.id),
            Err(LedgerError::BidNotFound)
        ));
        assert_eq!(db.bids_for_meme(m.id).unwrap().len(), 1);
    }

    #[test]
    fn settlement_scenario_across_two_users() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m = meme(&db, &a, "m");

        let a_bid = db.place_bid(m.id, a.id, 100).unwrap();
        assert_eq!(balance(&db, a.id), 400);

        let b = user(&db, "b");
        assert!(db.place_bid(m.id, b.id, 50).is_err());
        db.place_bid(m.id, b.id, 150).unwrap();
        assert_eq!(balance(&db, b.id), 350);

        db.cancel_bid(a_bid.bid.id, a.id).unwrap();
        assert_eq!(balance(&db, a.id), 500);

        let highest = db.highest_bid(m.id).unwrap().unwrap();
        assert_eq!((highest.amount, highest.user_id), (150, b.id));
    }

    #[test]
    fn user_bids_carry_meme_summary() {
        let db = Database::open_in_memory().unwrap();
        let a = user(&db, "a");
        let m1 = meme(&db, &a, "one");
        let m2 = meme(&db, &a, "two");

        db.place_bid(m1.id, a.id, 5).unwrap();
        db.place_bid(m2.id, a.id, 7).unwrap();

        let bids = db.bids_for_user(a.id).unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].bid.meme_id, m2.id);
        assert_eq!(bids[0].meme.as_ref().unwrap().title, "two");
        assert_eq!(bids[1].meme.as_ref().unwrap().title, "one");
    }

    #[test]
    fn removing_a_meme_refunds_outstanding_bids() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let a = user(&db, "a");
        let b = user(&db, "b");
        let m = meme(&db, &owner, "m");

        db.place_bid(m.id, a.id, 30).unwrap();
        db.place_bid(m.id, b.id, 60).unwrap();
        db.cast_vote(m.id, a.id, hustle_types::models::VoteType::Up).unwrap();

        let mut refunds = db.remove_meme(m.id).unwrap().unwrap();
        refunds.sort_by_key(|r| r.amount);
        assert_eq!(refunds.len(), 2);
        assert_eq!(refunds[0], Refund { user_id: a.id, amount: 30, credits: STARTING_CREDITS });
        assert_eq!(refunds[1], Refund { user_id: b.id, amount: 60, credits: STARTING_CREDITS });

        assert!(db.get_meme(m.id).unwrap().is_none());
        assert!(db.bids_for_user(a.id).unwrap().is_empty());
        assert!(db.votes_for_user(a.id).unwrap().is_empty());
        assert!(db.remove_meme(m.id).unwrap().is_none());
    }

    #[test]
    fn refunds_saturate_instead_of_overflowing() {
        let db = Database::open_in_memory().unwrap();
        let owner = user(&db, "owner");
        let a = user(&db, "a");
        let m = meme(&db, &owner, "m");
        let other = meme(&db, &owner, "other");

        db.set_credits(a.id, i64::MAX).unwrap();
        let placed = db.place_bid(m.id, a.id, 100).unwrap();
        db.place_bid(other.id, a.id, 200).unwrap();
        db.set_credits(a.id, i64::MAX).unwrap();

        let cancelled = db.cancel_bid(placed.bid.id, a.id).unwrap();
        assert_eq!(cancelled.refunded, 100);
        assert_eq!(cancelled.remaining_credits, i64::MAX);

        let refunds = db.remove_meme(other.id).unwrap().unwrap();
        assert_eq!(refunds, vec![Refund { user_id: a.id, amount: 200, credits: i64::MAX }]);
        assert!(db.get_meme(other.id).unwrap().is_none());
        assert_eq!(balance(&db, a.id), i64::MAX);
    }

    #[test]
    fn concurrent_bids_keep_the_maximum_monotonic() {
        use std::sync::Arc;

        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = user(&db, "owner");
        let m = meme(&db, &owner, "m");
        let bidders: Vec<_> = (0..8).map(|i| user(&db, &format!("u{}", i))).collect();

        // Everyone races with the same amount; exactly one can win.
        let handles: Vec<_> = bidders
            .iter()
            .map(|u| {
                let db = db.clone();
                let (meme_id, user_id) = (m.id, u.id);
                std::thread::spawn(move || db.place_bid(meme_id, user_id, 100).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(db.bids_for_meme(m.id).unwrap().len(), 1);
        let total: i64 = bidders.iter().map(|u| balance(&db, u.id)).sum();
        assert_eq!(total, STARTING_CREDITS * 8 - 100);
    }
}

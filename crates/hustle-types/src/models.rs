use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Balance granted to every account at signup.
pub const STARTING_CREDITS: i64 = 500;

/// Largest balance a user may set directly.
pub const MAX_CREDITS: i64 = 1_000_000_000;

/// Sanitized user: the password hash never leaves the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meme {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    pub tags: Vec<String>,
    pub caption: String,
    pub vibe: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub user_id: Uuid,
    /// Owner display name, "Anonymous" when the owner row is gone.
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

/// The slice of a meme attached to bid and vote histories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemeSummary {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    pub caption: String,
    pub vibe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub meme_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBid {
    #[serde(flatten)]
    pub bid: Bid,
    pub meme: Option<MemeSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown vote type '{}'", other)),
        }
    }
}

/// What a toggle did to the caller's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub meme_id: Uuid,
    pub user_id: Uuid,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVote {
    #[serde(flatten)]
    pub vote: Vote,
    pub meme: Option<MemeSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub upvotes: i64,
    pub downvotes: i64,
}

/// A meme row on a leaderboard. Only the metric the board ranks by is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMeme {
    #[serde(flatten)]
    pub meme: Meme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_bid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl RankedMeme {
    pub fn plain(meme: Meme) -> Self {
        Self {
            meme,
            bid_count: None,
            highest_bid: None,
            score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStanding {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub meme_count: i64,
    pub total_upvotes: i64,
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Bid, Meme, VoteAction, VoteType};

/// Events pushed over the real-time gateway.
///
/// Wire shape is `{"type": "<snake_case name>", "data": {...}}` with camelCase
/// payload keys, matching what the web client listens for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum HustleEvent {
    MemeCreated { meme: Meme },

    MemeUpdated { meme: Meme },

    MemeDeleted { meme_id: Uuid },

    MemeCaptionUpdated { meme: Meme },

    /// A bid was placed or raised. `user_credits` is the bidder's new balance.
    BidPlaced {
        meme_id: Uuid,
        bid: Bid,
        user_credits: i64,
    },

    BidCancelled {
        meme_id: Uuid,
        bid_id: Uuid,
        user_credits: i64,
    },

    VoteUpdated {
        meme_id: Uuid,
        meme: Meme,
        vote_type: VoteType,
        action: VoteAction,
    },

    CreditsUpdated { user_id: Uuid, credits: i64 },
}

impl HustleEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemeCreated { .. } => "meme_created",
            Self::MemeUpdated { .. } => "meme_updated",
            Self::MemeDeleted { .. } => "meme_deleted",
            Self::MemeCaptionUpdated { .. } => "meme_caption_updated",
            Self::BidPlaced { .. } => "bid_placed",
            Self::BidCancelled { .. } => "bid_cancelled",
            Self::VoteUpdated { .. } => "vote_updated",
            Self::CreditsUpdated { .. } => "credits_updated",
        }
    }

    /// Returns the meme this event is scoped to.
    /// `None` means the event is global and goes to every client.
    pub fn meme_id(&self) -> Option<Uuid> {
        match self {
            Self::MemeUpdated { meme } | Self::MemeCaptionUpdated { meme } => Some(meme.id),
            Self::MemeDeleted { meme_id }
            | Self::BidPlaced { meme_id, .. }
            | Self::BidCancelled { meme_id, .. }
            | Self::VoteUpdated { meme_id, .. } => Some(*meme_id),
            // New memes must reach every list view; balances are per user but
            // the gateway has no identity to route on.
            Self::MemeCreated { .. } | Self::CreditsUpdated { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Only forward meme-scoped events for these memes.
    Subscribe { meme_ids: Vec<Uuid> },

    /// Go back to receiving every event.
    Unsubscribe,
}

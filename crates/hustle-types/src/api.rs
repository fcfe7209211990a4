use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Bid, Meme, RankedMeme, User, UserBid, UserStanding, UserVote, VoteAction, VoteType,
};

// -- JWT Claims --

/// Identity token payload. Shared by the REST middleware and anything else
/// that needs to decode a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCreditsRequest {
    pub credits: i64,
}

// -- Memes --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemeRequest {
    pub title: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemeRequest {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemeListResponse {
    pub memes: Vec<Meme>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemeEnvelope {
    pub meme: Meme,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemeChangeResponse {
    pub message: String,
    pub meme: Meme,
}

// -- Bids --

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidResponse {
    pub message: String,
    pub bid: Bid,
    pub remaining_credits: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBidResponse {
    pub message: String,
    pub refunded_credits: i64,
    pub remaining_credits: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BidListResponse {
    pub bids: Vec<Bid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighestBidResponse {
    pub highest_bid: Option<Bid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserBidsResponse {
    pub bids: Vec<UserBid>,
}

// -- Votes --

/// `type` stays a raw string so an unknown value maps to a readable 400
/// instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(rename = "type")]
    pub vote_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub message: String,
    pub meme_id: Uuid,
    pub meme: Meme,
    pub vote_type: VoteType,
    pub action: VoteAction,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVoteResponse {
    pub vote_type: Option<VoteType>,
    pub has_voted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserVotesResponse {
    pub votes: Vec<UserVote>,
}

// -- Leaderboard --

#[derive(Debug, Serialize, Deserialize)]
pub struct RankedMemesResponse {
    pub memes: Vec<RankedMeme>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserStandingsResponse {
    pub users: Vec<UserStanding>,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub connections: usize,
}

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};

use hustle_types::api::{Claims, UserVoteResponse, UserVotesResponse, VoteRequest, VoteResponse};
use hustle_types::events::HustleEvent;
use hustle_types::models::{VoteCounts, VoteType};

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ApiResult};
use crate::extract::IdPath;

pub async fn vote_counts(
    State(state): State<AppState>,
    IdPath(meme_id): IdPath,
) -> ApiResult<Json<VoteCounts>> {
    let counts = blocking(&state, move |db| db.vote_counts(meme_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Meme not found"))?;
    Ok(Json(counts))
}

/// Toggle the caller's vote. Repeating a vote removes it; the opposite
/// vote flips it.
pub async fn cast_vote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    IdPath(meme_id): IdPath,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<VoteResponse>> {
    let vote_type: VoteType = match body {
        Ok(Json(req)) => req
            .vote_type
            .parse()
            .map_err(|_| ApiError::validation("Invalid vote type"))?,
        Err(_) => return Err(ApiError::validation("Invalid vote type")),
    };

    let user_id = claims.sub;
    let outcome = blocking(&state, move |db| db.cast_vote(meme_id, user_id, vote_type)).await?;

    state.dispatcher.broadcast(HustleEvent::VoteUpdated {
        meme_id,
        meme: outcome.meme.clone(),
        vote_type: outcome.vote_type,
        action: outcome.action,
    });

    Ok(Json(VoteResponse {
        message: "Vote processed successfully".into(),
        meme_id,
        meme: outcome.meme,
        vote_type: outcome.vote_type,
        action: outcome.action,
    }))
}

pub async fn user_vote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    IdPath(meme_id): IdPath,
) -> ApiResult<Json<UserVoteResponse>> {
    let vote_type = blocking(&state, move |db| db.user_vote(meme_id, claims.sub)).await?;
    Ok(Json(UserVoteResponse {
        vote_type,
        has_voted: vote_type.is_some(),
    }))
}

pub async fn user_votes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserVotesResponse>> {
    let votes = blocking(&state, move |db| db.votes_for_user(claims.sub)).await?;
    Ok(Json(UserVotesResponse { votes }))
}

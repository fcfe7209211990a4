use axum::{Json, extract::State};

use hustle_types::api::{RankedMemesResponse, UserStandingsResponse};

use crate::auth::{AppState, blocking};
use crate::error::ApiResult;
use crate::extract::Limit;

pub async fn trending(
    State(state): State<AppState>,
    Limit(limit): Limit,
) -> ApiResult<Json<RankedMemesResponse>> {
    let memes = blocking(&state, move |db| db.trending(limit)).await?;
    Ok(Json(RankedMemesResponse { memes }))
}

pub async fn most_bid(
    State(state): State<AppState>,
    Limit(limit): Limit,
) -> ApiResult<Json<RankedMemesResponse>> {
    let memes = blocking(&state, move |db| db.most_bid(limit)).await?;
    Ok(Json(RankedMemesResponse { memes }))
}

pub async fn highest_bids(
    State(state): State<AppState>,
    Limit(limit): Limit,
) -> ApiResult<Json<RankedMemesResponse>> {
    let memes = blocking(&state, move |db| db.highest_bids(limit)).await?;
    Ok(Json(RankedMemesResponse { memes }))
}

pub async fn recent(
    State(state): State<AppState>,
    Limit(limit): Limit,
) -> ApiResult<Json<RankedMemesResponse>> {
    let memes = blocking(&state, move |db| db.recent(limit)).await?;
    Ok(Json(RankedMemesResponse { memes }))
}

pub async fn overall(
    State(state): State<AppState>,
    Limit(limit): Limit,
) -> ApiResult<Json<RankedMemesResponse>> {
    let memes = blocking(&state, move |db| db.overall(limit)).await?;
    Ok(Json(RankedMemesResponse { memes }))
}

pub async fn users(
    State(state): State<AppState>,
    Limit(limit): Limit,
) -> ApiResult<Json<UserStandingsResponse>> {
    let users = blocking(&state, move |db| db.top_users(limit)).await?;
    Ok(Json(UserStandingsResponse { users }))
}

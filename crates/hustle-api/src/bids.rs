use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::info;

use hustle_types::api::{
    BidListResponse, CancelBidResponse, Claims, HighestBidResponse, PlaceBidRequest,
    PlaceBidResponse, UserBidsResponse,
};
use hustle_types::events::HustleEvent;

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ApiResult};
use crate::extract::IdPath;

pub async fn bids_for_meme(
    State(state): State<AppState>,
    IdPath(meme_id): IdPath,
) -> ApiResult<Json<BidListResponse>> {
    let bids = blocking(&state, move |db| db.bids_for_meme(meme_id)).await?;
    Ok(Json(BidListResponse { bids }))
}

pub async fn highest_bid(
    State(state): State<AppState>,
    IdPath(meme_id): IdPath,
) -> ApiResult<Json<HighestBidResponse>> {
    let highest_bid = blocking(&state, move |db| db.highest_bid(meme_id)).await?;
    Ok(Json(HighestBidResponse { highest_bid }))
}

pub async fn place_bid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    IdPath(meme_id): IdPath,
    body: Result<Json<PlaceBidRequest>, JsonRejection>,
) -> ApiResult<Json<PlaceBidResponse>> {
    // A non-integer or missing amount is the same client mistake as a
    // non-positive one.
    let amount = match body {
        Ok(Json(req)) => req.amount,
        Err(_) => return Err(ApiError::validation("Invalid bid amount")),
    };

    let user_id = claims.sub;
    let placement = blocking(&state, move |db| db.place_bid(meme_id, user_id, amount)).await?;

    info!(
        "Bid {} by {} on meme {}: {} credits{}",
        placement.bid.id,
        user_id,
        meme_id,
        amount,
        if placement.replaced { " (raised)" } else { "" }
    );

    state.dispatcher.broadcast(HustleEvent::BidPlaced {
        meme_id,
        bid: placement.bid.clone(),
        user_credits: placement.remaining_credits,
    });
    state.dispatcher.broadcast(HustleEvent::CreditsUpdated {
        user_id,
        credits: placement.remaining_credits,
    });

    Ok(Json(PlaceBidResponse {
        message: "Bid placed successfully".into(),
        bid: placement.bid,
        remaining_credits: placement.remaining_credits,
    }))
}

pub async fn user_bids(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserBidsResponse>> {
    let bids = blocking(&state, move |db| db.bids_for_user(claims.sub)).await?;
    Ok(Json(UserBidsResponse { bids }))
}

pub async fn cancel_bid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    IdPath(bid_id): IdPath,
) -> ApiResult<Json<CancelBidResponse>> {
    let user_id = claims.sub;
    let cancelled = blocking(&state, move |db| db.cancel_bid(bid_id, user_id)).await?;

    info!("Bid {} cancelled, {} credits refunded", bid_id, cancelled.refunded);

    state.dispatcher.broadcast(HustleEvent::BidCancelled {
        meme_id: cancelled.meme_id,
        bid_id,
        user_credits: cancelled.remaining_credits,
    });
    state.dispatcher.broadcast(HustleEvent::CreditsUpdated {
        user_id,
        credits: cancelled.remaining_credits,
    });

    Ok(Json(CancelBidResponse {
        message: "Bid cancelled successfully".into(),
        refunded_credits: cancelled.refunded,
        remaining_credits: cancelled.remaining_credits,
    }))
}

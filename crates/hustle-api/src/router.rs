use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};

use hustle_gateway::connection;
use hustle_types::api::HealthResponse;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{bids, leaderboard, memes, votes};

/// Every REST route plus the WebSocket gateway. CORS and request tracing are
/// layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/memes", get(memes::list_memes))
        .route("/api/memes/{id}", get(memes::get_meme))
        .route("/api/bids/meme/{meme_id}", get(bids::bids_for_meme))
        .route("/api/bids/meme/{meme_id}/highest", get(bids::highest_bid))
        .route("/api/votes/meme/{meme_id}", get(votes::vote_counts))
        .route("/api/leaderboard/trending", get(leaderboard::trending))
        .route("/api/leaderboard/most-bid", get(leaderboard::most_bid))
        .route("/api/leaderboard/highest-bids", get(leaderboard::highest_bids))
        .route("/api/leaderboard/recent", get(leaderboard::recent))
        .route("/api/leaderboard/overall", get(leaderboard::overall))
        .route("/api/leaderboard/users", get(leaderboard::users))
        .route("/ws", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/auth/credits", put(auth::update_credits))
        .route("/api/memes", post(memes::create_meme))
        .route("/api/memes/{id}", put(memes::update_meme).delete(memes::delete_meme))
        .route("/api/memes/{id}/caption", post(memes::regenerate_caption))
        .route("/api/bids/meme/{meme_id}", post(bids::place_bid))
        .route("/api/bids/user", get(bids::user_bids))
        .route("/api/bids/{bid_id}", delete(bids::cancel_bid))
        .route("/api/votes/meme/{meme_id}", post(votes::cast_vote))
        .route("/api/votes/meme/{meme_id}/user", get(votes::user_vote))
        .route("/api/votes/user", get(votes::user_votes))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".into(),
        message: "MemeHustle API is running!".into(),
        connections: state.dispatcher.connection_count(),
    })
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}

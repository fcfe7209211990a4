pub mod auth;
pub mod bids;
pub mod error;
pub mod extract;
pub mod generator;
pub mod leaderboard;
pub mod memes;
pub mod middleware;
pub mod router;
pub mod votes;

pub use auth::{AppState, AppStateInner};
pub use router::router;

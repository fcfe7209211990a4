use axum::{
    extract::{FromRequestParts, Path, Query},
    http::request::Parts,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// A single UUID path segment. Malformed ids are a 400 with a JSON body
/// instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for IdPath {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        raw.parse()
            .map(IdPath)
            .map_err(|_| ApiError::validation("Invalid id"))
    }
}

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<String>,
}

/// `?limit=` clamped to `1..=MAX_LIMIT`. Absent or unparsable means the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u32);

impl Limit {
    fn from_raw(raw: Option<&str>) -> Self {
        let limit = raw
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(|n| n.clamp(1, MAX_LIMIT as i64) as u32)
            .unwrap_or(DEFAULT_LIMIT);
        Limit(limit)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Limit {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<LimitQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        Ok(Limit::from_raw(query.limit.as_deref()))
    }
}

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use hustle_db::{MemePatch, NewMeme};
use hustle_types::api::{
    Claims, CreateMemeRequest, MemeChangeResponse, MemeEnvelope, MemeListResponse,
    MessageResponse, UpdateMemeRequest,
};
use hustle_types::events::HustleEvent;
use hustle_types::models::Meme;

use crate::auth::{AppState, blocking};
use crate::error::{ApiError, ApiResult};
use crate::extract::IdPath;

pub const DEFAULT_IMAGE_URL: &str = "https://picsum.photos/400/300";

pub async fn list_memes(State(state): State<AppState>) -> ApiResult<Json<MemeListResponse>> {
    let memes = blocking(&state, |db| db.list_memes()).await?;
    Ok(Json(MemeListResponse { memes }))
}

pub async fn get_meme(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Json<MemeEnvelope>> {
    let meme = load_meme(&state, id).await?;
    Ok(Json(MemeEnvelope { meme }))
}

pub async fn create_meme(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateMemeRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;

    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    let image_url = image_url_or_default(req.image_url.as_deref().unwrap_or_default());

    let (caption, vibe) = tokio::join!(
        state.generator.caption(&title, &req.tags),
        state.generator.vibe(&req.tags),
    );

    let new_meme = NewMeme {
        id: Uuid::new_v4(),
        title,
        image_url,
        tags: req.tags,
        caption,
        vibe,
        user_id: claims.sub,
    };
    let meme = blocking(&state, move |db| db.insert_meme(&new_meme)).await?;

    info!("Meme {} created by {}", meme.id, claims.sub);
    state.dispatcher.broadcast(HustleEvent::MemeCreated { meme: meme.clone() });

    Ok((
        StatusCode::CREATED,
        Json(MemeChangeResponse {
            message: "Meme created successfully".into(),
            meme,
        }),
    ))
}

/// Owner-only partial update. Non-empty `tags` regenerate caption and vibe.
pub async fn update_meme(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    IdPath(id): IdPath,
    body: Result<Json<UpdateMemeRequest>, JsonRejection>,
) -> ApiResult<Json<MemeChangeResponse>> {
    let Json(req) = body?;

    let existing = load_meme(&state, id).await?;
    if existing.user_id != claims.sub {
        return Err(ApiError::forbidden("Not authorized to update this meme"));
    }

    let title = match req.title.map(|t| t.trim().to_string()) {
        Some(t) if t.is_empty() => return Err(ApiError::validation("Title cannot be empty")),
        other => other,
    };

    let mut patch = MemePatch {
        image_url: req.image_url.as_deref().map(image_url_or_default),
        ..MemePatch::default()
    };

    if let Some(tags) = req.tags.filter(|tags| !tags.is_empty()) {
        let caption_title = title.as_deref().unwrap_or(&existing.title);
        let (caption, vibe) = tokio::join!(
            state.generator.caption(caption_title, &tags),
            state.generator.vibe(&tags),
        );
        patch.caption = Some(caption);
        patch.vibe = Some(vibe);
        patch.tags = Some(tags);
    }
    patch.title = title;

    let meme = blocking(&state, move |db| db.update_meme(id, &patch))
        .await?
        .ok_or_else(|| ApiError::not_found("Meme not found"))?;

    state.dispatcher.broadcast(HustleEvent::MemeUpdated { meme: meme.clone() });

    Ok(Json(MemeChangeResponse {
        message: "Meme updated successfully".into(),
        meme,
    }))
}

/// Owner-only delete. Outstanding bids on the meme are refunded first.
pub async fn delete_meme(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    IdPath(id): IdPath,
) -> ApiResult<Json<MessageResponse>> {
    let existing = load_meme(&state, id).await?;
    if existing.user_id != claims.sub {
        return Err(ApiError::forbidden("Not authorized to delete this meme"));
    }

    let refunds = blocking(&state, move |db| db.remove_meme(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Meme not found"))?;

    info!("Meme {} deleted, {} bids refunded", id, refunds.len());
    state.dispatcher.broadcast(HustleEvent::MemeDeleted { meme_id: id });
    for refund in refunds {
        state.dispatcher.broadcast(HustleEvent::CreditsUpdated {
            user_id: refund.user_id,
            credits: refund.credits,
        });
    }

    Ok(Json(MessageResponse {
        message: "Meme deleted successfully".into(),
    }))
}

/// Any signed-in user may ask for a fresh caption.
pub async fn regenerate_caption(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    IdPath(id): IdPath,
) -> ApiResult<Json<MemeChangeResponse>> {
    let existing = load_meme(&state, id).await?;

    let caption = state.generator.caption(&existing.title, &existing.tags).await;
    let patch = MemePatch {
        caption: Some(caption),
        ..MemePatch::default()
    };

    let meme = blocking(&state, move |db| db.update_meme(id, &patch))
        .await?
        .ok_or_else(|| ApiError::not_found("Meme not found"))?;

    state.dispatcher.broadcast(HustleEvent::MemeCaptionUpdated { meme: meme.clone() });

    Ok(Json(MemeChangeResponse {
        message: "Caption generated successfully".into(),
        meme,
    }))
}

pub(crate) async fn load_meme(state: &AppState, id: Uuid) -> ApiResult<Meme> {
    blocking(state, move |db| db.get_meme(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Meme not found"))
}

/// A blank image URL, on create or update, means the placeholder image.
fn image_url_or_default(raw: &str) -> String {
    match raw.trim() {
        "" => DEFAULT_IMAGE_URL.to_string(),
        url => url.to_string(),
    }
}

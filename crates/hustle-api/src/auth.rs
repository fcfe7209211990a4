use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use hustle_db::Database;
use hustle_gateway::Dispatcher;
use hustle_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest, UpdateCreditsRequest, UserResponse};
use hustle_types::models::MAX_CREDITS;

use crate::error::{ApiError, ApiResult};
use crate::generator::CaptionGenerator;

/// Identity tokens are valid for a fixed 24 hours.
const TOKEN_LIFETIME_HOURS: i64 = 24;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub generator: CaptionGenerator,
}

/// Run a storage call off the async runtime.
pub(crate) async fn blocking<F, T, E>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await?
        .map_err(Into::into)
}

pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;

    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Name, email and password are required"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("Invalid email"));
    }

    let user_id = Uuid::new_v4();
    let password = req.password;

    let user = blocking(&state, move |db| -> ApiResult<_> {
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        db.create_user(user_id, &name, &email, &password_hash)?
            .ok_or_else(|| ApiError::Conflict("User already exists".into()))
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;
    info!("User {} signed up", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully".into(),
            user,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let Json(req) = body?;
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    let user = blocking(&state, move |db| -> ApiResult<_> {
        let row = db
            .get_user_by_email(&email)?
            .ok_or(ApiError::InvalidCredentials)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&row.password_hash)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::InvalidCredentials)?;

        Ok(row.user)
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;

    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        user,
        token,
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserResponse>> {
    let user = blocking(&state, move |db| db.get_user(claims.sub))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse { user }))
}

/// Overwrite the caller's balance. Outstanding bids are not consulted.
pub async fn update_credits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<UpdateCreditsRequest>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let Json(req) = body?;
    if req.credits < 0 {
        return Err(ApiError::validation("Credits cannot be negative"));
    }
    if req.credits > MAX_CREDITS {
        return Err(ApiError::validation(format!("Credits cannot exceed {}", MAX_CREDITS)));
    }

    let user = blocking(&state, move |db| db.set_credits(claims.sub, req.credits))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse { user }))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Check signature and expiry.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::InvalidToken)
}

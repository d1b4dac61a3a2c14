use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::TimeDelta;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use signage_db::Database;
use signage_gateway::dispatcher::Dispatcher;
use signage_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use signage_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::storage::Storage;

/// Session tokens stay valid this long.
const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub storage: Arc<Storage>,
    pub settings: Settings,
}

/// Runtime knobs the handlers need.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared secret for `POST /device/provision`; `None` disables provisioning.
    pub provision_token: Option<String>,
    /// A display counts as online if it was seen within this window.
    pub online_window: TimeDelta,
    pub max_upload_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provision_token: None,
            online_window: TimeDelta::seconds(signage_core::presence::DEFAULT_ONLINE_WINDOW_SECS),
            max_upload_bytes: 200 * 1024 * 1024,
        }
    }
}

impl AppStateInner {
    /// Run blocking database work off the async runtime.
    pub async fn with_db<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(ApiError::from)
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::bad_request("username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    let username = req.username.clone();
    if state
        .with_db(move |db| db.get_user_by_username(&username))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username already taken".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let username = req.username.clone();
    // A concurrent registration can still win between the lookup and the insert.
    if !state
        .with_db(move |db| db.create_user(&user_id.to_string(), &username, &password_hash))
        .await?
    {
        return Err(ApiError::Conflict("username already taken".into()));
    }

    let token = create_token(&state.jwt_secret, user_id, &req.username)?;
    info!("Registered user {} ({})", req.username, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let username = req.username.clone();
    let user = state
        .with_db(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user.id.parse().map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, Extension(claims): Extension<Claims>) -> ApiResult<Json<User>> {
    let id = claims.sub;
    let user = state
        .with_db(move |db| db.get_user_by_id(&id.to_string()))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let created_at = signage_db::models::parse_timestamp(&user.created_at)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("bad created_at for user {}", id)))?;

    Ok(Json(User {
        id,
        username: user.username,
        created_at,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + TimeDelta::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use signage_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

pub const DISPLAY_ID_HEADER: &str = "x-display-id";
pub const DEVICE_KEY_HEADER: &str = "x-device-key";
pub const PROVISION_TOKEN_HEADER: &str = "x-provision-token";

/// Where browsers without a session are sent.
const LOGIN_PATH: &str = "/login";

/// The authenticated display behind a device request.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub display_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub playlist_id: Option<Uuid>,
}

pub fn hash_device_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Route guard: validate the bearer JWT and expose its `Claims` to handlers.
/// Browser navigations without a session are redirected to the login page.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = bearer.and_then(|TypedHeader(auth)| decode_token(auth.token(), &state.jwt_secret));

    match claims {
        Some(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        None if wants_html(req.headers()) => Redirect::to(LOGIN_PATH).into_response(),
        None => ApiError::Unauthorized.into_response(),
    }
}

/// Authenticate a display by its id and device key.
pub async fn require_device(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match device_identity(&state, req.headers()).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

async fn device_identity(state: &AppState, headers: &HeaderMap) -> Result<DeviceIdentity, ApiError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    let display_id: Uuid = header_str(DISPLAY_ID_HEADER)
        .and_then(|v| v.parse().ok())
        .ok_or(ApiError::Unauthorized)?;
    let key = header_str(DEVICE_KEY_HEADER).ok_or(ApiError::Unauthorized)?;

    let row = state
        .with_db(move |db| db.get_device_auth(&display_id.to_string()))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if row.device_key_hash != hash_device_key(&key) {
        debug!("Display {} presented a wrong device key", display_id);
        return Err(ApiError::Unauthorized);
    }

    Ok(DeviceIdentity {
        display_id: row.id,
        owner_id: row.user_id,
        playlist_id: row.playlist_id,
    })
}

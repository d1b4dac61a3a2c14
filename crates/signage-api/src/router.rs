use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use signage_gateway::connection;

use crate::auth::{self, AppState};
use crate::middleware::{require_auth, require_device};
use crate::{contents, devices, displays, playlists};

/// The whole HTTP surface: public, user, device, realtime and media routes.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/device/provision", post(devices::provision));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/displays", get(displays::list_displays))
        .route("/displays/claim", post(displays::claim_display))
        .route(
            "/displays/{id}",
            get(displays::get_display)
                .patch(displays::update_display)
                .delete(displays::delete_display),
        )
        .route("/displays/{id}/commands", post(displays::send_command))
        .route("/playlists", get(playlists::list_playlists).post(playlists::create_playlist))
        .route(
            "/playlists/{id}",
            get(playlists::get_playlist)
                .patch(playlists::update_playlist)
                .delete(playlists::delete_playlist),
        )
        .route("/playlists/{id}/items", post(playlists::add_item))
        .route("/playlists/{id}/items/reorder", post(playlists::reorder_items))
        .route(
            "/playlists/{id}/items/{item_id}",
            patch(playlists::update_item).delete(playlists::remove_item),
        )
        .route("/playlists/{id}/preview", get(playlists::preview))
        .route("/folders", get(contents::list_folders).post(contents::create_folder))
        .route("/folders/{id}", delete(contents::delete_folder))
        .route(
            "/folders/{id}/contents",
            get(contents::list_contents).post(contents::upload_content),
        )
        .route("/contents/{id}", delete(contents::delete_content))
        .route("/browse", get(contents::browse))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let device_routes = Router::new()
        .route("/device/heartbeat", post(devices::heartbeat))
        .route("/device/playlist", get(devices::playlist))
        .route("/device/commands", get(devices::commands))
        .route("/device/commands/{id}/ack", post(devices::ack_command))
        .route("/device/logs", post(devices::post_log))
        .route("/device/screenshots", post(devices::post_screenshot))
        .route("/device/gateway", get(devices::gateway))
        .layer(middleware::from_fn_with_state(state.clone(), require_device));

    // The dashboard socket authenticates in-band with Identify.
    let ws_route = Router::new().route("/gateway", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(device_routes)
        .merge(ws_route)
        .nest_service("/media", ServeDir::new(state.storage.dir()))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, jwt_secret))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use signage_db::Database;
    use signage_gateway::dispatcher::Dispatcher;

    use super::*;
    use crate::auth::{AppStateInner, Settings};
    use crate::storage::Storage;

    async fn test_state(dir: &tempfile::TempDir) -> AppState {
        let storage = Storage::new(dir.path().to_path_buf(), "http://localhost:3000")
            .await
            .unwrap();
        Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: "router-test-secret".into(),
            dispatcher: Dispatcher::new(),
            storage: Arc::new(storage),
            settings: Settings::default(),
        })
    }

    #[tokio::test]
    async fn health_is_public() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn api_calls_without_token_get_401() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(Request::get("/playlists").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn browser_navigation_is_redirected_to_login() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(
                Request::get("/displays")
                    .header(header::ACCEPT, "text/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn bad_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(
                Request::get("/auth/me")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn device_routes_need_device_headers() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(Request::get("/device/playlist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn provisioning_is_disabled_without_a_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(Request::post("/device/provision").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stored_media_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("contents")).unwrap();
        std::fs::write(dir.path().join("contents/hello.txt"), b"hello").unwrap();
        let app = build_router(test_state(&dir).await);

        let res = app
            .oneshot(Request::get("/media/contents/hello.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }
}

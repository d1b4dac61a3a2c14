#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use signage_api::auth::{AppState, AppStateInner, Settings};
use signage_api::middleware::{DEVICE_KEY_HEADER, DISPLAY_ID_HEADER};
use signage_api::router::build_router;
use signage_api::storage::Storage;
use signage_db::Database;
use signage_gateway::dispatcher::Dispatcher;

pub const PROVISION_TOKEN: &str = "factory-floor";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _media: TempDir,
}

pub async fn spawn_app() -> TestApp {
    let media = tempfile::tempdir().unwrap();
    let storage = Storage::new(media.path().to_path_buf(), "http://localhost:3000")
        .await
        .unwrap();
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        jwt_secret: "integration-test-secret".into(),
        dispatcher: Dispatcher::new(),
        storage: Arc::new(storage),
        settings: Settings {
            provision_token: Some(PROVISION_TOKEN.into()),
            max_upload_bytes: 64 * 1024,
            ..Settings::default()
        },
    });
    TestApp {
        router: build_router(state.clone()),
        state,
        _media: media,
    }
}

/// Device credentials as returned by provisioning.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub key: String,
    pub pairing_code: String,
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn device(&self, method: Method, uri: &str, device: &Device, body: Option<Value>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(DISPLAY_ID_HEADER, &device.id)
            .header(DEVICE_KEY_HEADER, &device.key);
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(serde_json::json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn upload(&self, token: &str, folder_id: &str, name: &str, content_type: &str, data: &'static [u8]) -> Value {
        let req = Request::post(format!("/folders/{}/contents?name={}", folder_id, name))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(data))
            .unwrap();
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    pub async fn provision(&self) -> Device {
        let req = Request::post("/device/provision?name=Lobby%20screen")
            .header(signage_api::middleware::PROVISION_TOKEN_HEADER, PROVISION_TOKEN)
            .body(Body::empty())
            .unwrap();
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        Device {
            id: body["display_id"].as_str().unwrap().to_string(),
            key: body["device_key"].as_str().unwrap().to_string(),
            pairing_code: body["pairing_code"].as_str().unwrap().to_string(),
        }
    }
}

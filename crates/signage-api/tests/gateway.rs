mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{TestApp, spawn_app};
use signage_api::middleware::{DEVICE_KEY_HEADER, DISPLAY_ID_HEADER};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Next JSON text frame, skipping pings.
async fn next_json(ws: &mut Socket) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for a gateway message")
}

async fn send_json(ws: &mut Socket, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn dashboard_receives_only_its_own_subscribed_changes() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (mut ws, _) = connect_async(format!("ws://{}/gateway", addr)).await.unwrap();
    send_json(&mut ws, json!({ "type": "Identify", "data": { "token": alice } })).await;

    let ready = next_json(&mut ws).await;
    assert_eq!(ready["type"], "Ready");
    assert_eq!(ready["data"]["username"], "alice");

    send_json(&mut ws, json!({ "type": "Subscribe", "data": { "tables": ["playlists"] } })).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    app.json(Method::POST, "/playlists", Some(&bob), Some(json!({ "name": "Not yours" })))
        .await;
    app.json(Method::POST, "/folders", Some(&alice), Some(json!({ "name": "Filtered" })))
        .await;
    let (status, playlist) = app
        .json(Method::POST, "/playlists", Some(&alice), Some(json!({ "name": "Yours" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let changed = next_json(&mut ws).await;
    assert_eq!(changed["type"], "TableChanged");
    assert_eq!(changed["data"]["table"], "playlists");
    assert_eq!(changed["data"]["action"], "insert");
    assert_eq!(changed["data"]["id"], playlist["id"]);
}

#[tokio::test]
async fn gateway_closes_without_identify() {
    let app = spawn_app().await;
    let addr = serve(&app).await;

    let (mut ws, _) = connect_async(format!("ws://{}/gateway", addr)).await.unwrap();
    send_json(&mut ws, json!({ "type": "Identify", "data": { "token": "forged" } })).await;

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => panic!("unexpected message: {}", text),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn connected_display_gets_commands_pushed() {
    let app = spawn_app().await;
    let addr = serve(&app).await;
    let token = app.register("alice").await;
    let device = app.provision().await;
    let (status, _) = app
        .json(
            Method::POST,
            "/displays/claim",
            Some(&token),
            Some(json!({ "code": device.pairing_code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut req = format!("ws://{}/device/gateway", addr).into_client_request().unwrap();
    req.headers_mut()
        .insert(DISPLAY_ID_HEADER, HeaderValue::from_str(&device.id).unwrap());
    req.headers_mut()
        .insert(DEVICE_KEY_HEADER, HeaderValue::from_str(&device.key).unwrap());
    let (mut ws, _) = connect_async(req).await.unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "Hello");
    assert_eq!(hello["data"]["display_id"], device.id.as_str());

    let (_, detail) = app
        .json(Method::GET, &format!("/displays/{}", device.id), Some(&token), None)
        .await;
    assert_eq!(detail["connected"], true);

    let (status, command) = app
        .json(
            Method::POST,
            &format!("/displays/{}/commands", device.id),
            Some(&token),
            Some(json!({ "kind": "run", "payload": { "url": "https://example.com" } })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(command["status"], "pending");

    let pushed = next_json(&mut ws).await;
    assert_eq!(pushed["type"], "Command");
    assert_eq!(pushed["data"]["id"], command["id"]);
    assert_eq!(pushed["data"]["kind"], "run");
    assert_eq!(pushed["data"]["payload"]["url"], "https://example.com");

    let ack_uri = format!("/device/commands/{}/ack", command["id"].as_str().unwrap());
    let (status, _) = app.device(Method::POST, &ack_uri, &device, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, playlist) = app
        .json(Method::POST, "/playlists", Some(&token), Some(json!({ "name": "Loop" })))
        .await;
    app.json(
        Method::PATCH,
        &format!("/displays/{}", device.id),
        Some(&token),
        Some(json!({ "playlist_id": playlist["id"] })),
    )
    .await;

    let assigned = next_json(&mut ws).await;
    assert_eq!(assigned["type"], "PlaylistAssigned");
    assert_eq!(assigned["data"]["playlist_id"], playlist["id"]);
}

#[tokio::test]
async fn device_gateway_rejects_unknown_displays() {
    let app = spawn_app().await;
    let addr = serve(&app).await;

    let mut req = format!("ws://{}/device/gateway", addr).into_client_request().unwrap();
    req.headers_mut()
        .insert(DISPLAY_ID_HEADER, HeaderValue::from_static("00000000-0000-0000-0000-000000000000"));
    req.headers_mut()
        .insert(DEVICE_KEY_HEADER, HeaderValue::from_static("nope"));
    assert!(connect_async(req).await.is_err());
}

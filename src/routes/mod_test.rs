use super::*;
use crate::config::Config;
use crate::frame::Frame;
use crate::state::test_helpers::{self, TestStores};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, token: Option<&str>) -> Client {
    let mut request = format!("ws://{addr}/api/ws").into_client_request().unwrap();
    if let Some(token) = token {
        let cookie = HeaderValue::from_str(&format!("session_token={token}")).unwrap();
        request.headers_mut().insert(header::COOKIE, cookie);
    }
    let (client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    client
}

async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("websocket receive timed out")
            .expect("websocket closed")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Wait until `n` sockets have finished opening on the server side.
async fn wait_for_subscribers(state: &AppState, n: usize) {
    timeout(Duration::from_secs(2), async {
        while state.bus.subscriber_count().await < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscribers did not register");
}

fn seeded() -> (AppState, TestStores) {
    let (state, stores) = test_helpers::test_app_state();
    test_helpers::seed_user_session(&stores, 7, "Maria", "maria-token");
    (state, stores)
}

// =============================================================================
// HTTP
// =============================================================================

#[tokio::test]
async fn health_is_ok() {
    let (state, _stores) = test_helpers::test_app_state();
    let addr = serve(state).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn weather_requires_query() {
    let (state, _stores) = test_helpers::test_app_state();
    let addr = serve(state).await;

    let response = reqwest::get(format!("http://{addr}/api/weather?q=%20")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Missing q" }));
}

#[tokio::test]
async fn weather_without_key_is_unavailable() {
    let (state, _stores) = test_helpers::test_app_state();
    let addr = serve(state).await;

    let response = reqwest::get(format!("http://{addr}/api/weather?q=Cebu")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn me_reads_session_cookie() {
    let (state, _stores) = seeded();
    let addr = serve(state).await;

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("http://{addr}/api/auth/me"))
        .header(reqwest::header::COOKIE, "session_token=maria-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, serde_json::json!({ "user_id": 7, "username": "Maria" }));
}

// =============================================================================
// WEBSOCKET
// =============================================================================

#[tokio::test]
async fn chat_message_reaches_sender_and_peer() {
    let (state, stores) = seeded();
    let addr = serve(state.clone()).await;

    let mut maria = connect(addr, Some("maria-token")).await;
    let mut guest = connect(addr, None).await;
    wait_for_subscribers(&state, 2).await;

    maria
        .send(WsMessage::text(r#"{"event":"chat:message","data":"  Kumusta!  "}"#))
        .await
        .unwrap();

    for client in [&mut maria, &mut guest] {
        let frame = next_json(client).await;
        assert_eq!(frame["event"], "chat:message");
        assert_eq!(frame["data"]["username"], "Maria");
        assert_eq!(frame["data"]["message"], "Kumusta!");
        assert!(frame["data"]["created_at"].is_string());
    }
    assert_eq!(stores.messages.rows().len(), 1);
}

#[tokio::test]
async fn guest_socket_posts_as_guest() {
    let (state, _stores) = seeded();
    let addr = serve(state.clone()).await;

    let mut guest = connect(addr, Some("expired-or-unknown")).await;
    wait_for_subscribers(&state, 1).await;

    guest
        .send(WsMessage::text(r#"{"event":"chat:message","data":"Hi"}"#))
        .await
        .unwrap();

    let frame = next_json(&mut guest).await;
    assert_eq!(frame["data"]["username"], "Guest");
}

#[tokio::test]
async fn blank_message_is_not_broadcast() {
    let (state, stores) = seeded();
    let addr = serve(state.clone()).await;

    let mut client = connect(addr, None).await;
    wait_for_subscribers(&state, 1).await;

    client
        .send(WsMessage::text(r#"{"event":"chat:message","data":"   "}"#))
        .await
        .unwrap();
    client
        .send(WsMessage::text(r#"{"event":"chat:message","data":"after"}"#))
        .await
        .unwrap();

    // The first frame seen is the second message: the blank one produced nothing.
    assert_eq!(next_json(&mut client).await["data"]["message"], "after");
    assert_eq!(stores.messages.rows().len(), 1);
}

#[tokio::test]
async fn disconnect_unsubscribes() {
    let (state, _stores) = seeded();
    let addr = serve(state.clone()).await;

    let mut client = connect(addr, None).await;
    wait_for_subscribers(&state, 1).await;
    client.close(None).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while state.bus.subscriber_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("closed socket should leave the bus");
}

#[tokio::test]
async fn drain_closes_open_sockets() {
    let (state, _stores) = seeded();
    let addr = serve(state.clone()).await;

    let mut client = connect(addr, None).await;
    wait_for_subscribers(&state, 1).await;
    state.bus.drain().await;

    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                None | Some(Err(_) | Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket should close after drain");
}

#[tokio::test]
async fn bus_frames_keep_flowing_while_own_append_is_slow() {
    let config = Config { client_queue_capacity: 2, ..Config::default() };
    let (state, stores) = test_helpers::test_app_state_with_config(config);
    stores.messages.set_delay(Duration::from_millis(400));
    let addr = serve(state.clone()).await;

    let mut client = connect(addr, None).await;
    wait_for_subscribers(&state, 1).await;
    client
        .send(WsMessage::text(r#"{"event":"chat:message","data":"slow"}"#))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // More frames than the queue holds arrive while the append is in flight.
    for n in 0..5 {
        let frame = Frame::new("chat:message", serde_json::json!({ "message": format!("peer {n}") }));
        assert_eq!(state.bus.publish(&frame).await, 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for n in 0..5 {
        assert_eq!(next_json(&mut client).await["data"]["message"], format!("peer {n}"));
    }
    assert_eq!(next_json(&mut client).await["data"]["message"], "slow");
}

use std::net::TcpListener;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use futures::{SinkExt, StreamExt};
use presence_relay::{configure_routes, AppState, Settings};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn spawn_relay() -> String {
    spawn_relay_with(Settings::new_for_test().expect("Failed to load test config"))
}

fn spawn_relay_with(settings: Settings) -> String {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let state = web::Data::new(AppState::new(settings));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .listen(listener)
    .expect("Failed to listen")
    .workers(2)
    .run();
    actix_rt::spawn(server);

    format!("ws://127.0.0.1:{}/ws", port)
}

async fn connect(url: &str) -> Client {
    let (client, _) = connect_async(url).await.expect("Failed to connect");
    client
}

async fn send(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON frame from the server, skipping transport pings.
async fn next_frame(client: &mut Client) -> Value {
    next_frame_within(client, RECV_TIMEOUT).await
}

async fn next_frame_within(client: &mut Client, limit: Duration) -> Value {
    loop {
        let msg = timeout(limit, client.next())
            .await
            .expect("Timed out waiting for frame")
            .expect("Connection closed")
            .expect("Websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("Server sent invalid JSON");
        }
    }
}

async fn register(client: &mut Client, fullname: &str, email: &str) {
    send(
        client,
        json!({
            "type": "register",
            "payload": { "fullname": fullname, "email": email, "country": "US" }
        }),
    )
    .await;
}

fn names(frame: &Value) -> Vec<String> {
    assert_eq!(frame["type"], "onlineUsers", "unexpected frame {}", frame);
    frame["payload"]
        .as_array()
        .expect("onlineUsers payload must be an array")
        .iter()
        .map(|user| user["fullname"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[actix_web::test]
async fn test_presence_message_and_typing_flow() {
    let url = spawn_relay();

    let mut ada = connect(&url).await;
    register(&mut ada, "Ada", "a@x.com").await;
    assert_eq!(names(&next_frame(&mut ada).await), vec!["Ada"]);

    let mut bob = connect(&url).await;
    register(&mut bob, "Bob", "b@x.com").await;
    assert_eq!(names(&next_frame(&mut ada).await), vec!["Ada", "Bob"]);
    assert_eq!(names(&next_frame(&mut bob).await), vec!["Ada", "Bob"]);

    // Both sides, sender included, get the same stamped message.
    send(&mut ada, json!({ "type": "message", "payload": "hi" })).await;
    let to_ada = next_frame(&mut ada).await;
    let to_bob = next_frame(&mut bob).await;
    assert_eq!(to_ada["type"], "message");
    assert_eq!(to_ada["payload"]["sender"]["fullname"], "Ada");
    assert_eq!(to_ada["payload"]["text"], "hi");
    assert_eq!(to_ada, to_bob);

    // Bob's typing goes to Ada only.
    send(&mut bob, json!({ "type": "typing", "payload": true })).await;
    let typing = next_frame(&mut ada).await;
    assert_eq!(typing["type"], "typing");
    assert_eq!(typing["payload"]["sender"]["email"], "b@x.com");
    assert_eq!(typing["payload"]["isTyping"], true);

    // Blank text is dropped; the next frame Bob sees is the real message,
    // which also shows no typing echo reached him.
    send(&mut ada, json!({ "type": "message", "payload": "   " })).await;
    send(&mut ada, json!({ "type": "message", "payload": "still there?" })).await;
    let next = next_frame(&mut bob).await;
    assert_eq!(next["type"], "message");
    assert_eq!(next["payload"]["text"], "still there?");

    ada.close(None).await.expect("Failed to close");
    assert_eq!(names(&next_frame(&mut bob).await), vec!["Bob"]);
}

#[actix_web::test]
async fn test_unregistered_sender_and_bad_frames() {
    let url = spawn_relay();
    let mut anon = connect(&url).await;

    send(&mut anon, json!({ "type": "message", "payload": "who am i" })).await;
    let frame = next_frame(&mut anon).await;
    assert_eq!(frame["type"], "message");
    assert!(frame["payload"]["sender"].is_null());

    anon.send(Message::Text("not json".to_string())).await.unwrap();
    let frame = next_frame(&mut anon).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["payload"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message format"));

    anon.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let frame = next_frame(&mut anon).await;
    assert_eq!(frame["type"], "error");

    // The connection survives malformed input.
    send(&mut anon, json!({ "type": "ping" })).await;
    assert_eq!(next_frame(&mut anon).await["type"], "pong");
}

#[actix_web::test]
async fn test_typing_expires_without_refresh() {
    let url = spawn_relay();

    let mut ada = connect(&url).await;
    register(&mut ada, "Ada", "a@x.com").await;
    next_frame(&mut ada).await;

    let mut bob = connect(&url).await;
    register(&mut bob, "Bob", "b@x.com").await;
    next_frame(&mut ada).await;
    next_frame(&mut bob).await;

    send(&mut bob, json!({ "type": "typing", "payload": true })).await;
    assert_eq!(next_frame(&mut ada).await["payload"]["isTyping"], true);

    let stopped = next_frame(&mut ada).await;
    assert_eq!(stopped["type"], "typing");
    assert_eq!(stopped["payload"]["isTyping"], false);
    assert_eq!(stopped["payload"]["sender"]["fullname"], "Bob");
}

#[actix_web::test]
async fn test_dropped_socket_counts_as_disconnect() {
    let url = spawn_relay();

    let mut ada = connect(&url).await;
    register(&mut ada, "Ada", "a@x.com").await;
    next_frame(&mut ada).await;

    let mut bob = connect(&url).await;
    register(&mut bob, "Bob", "b@x.com").await;
    next_frame(&mut ada).await;
    assert_eq!(names(&next_frame(&mut bob).await), vec!["Ada", "Bob"]);

    // No close frame: the TCP stream just goes away.
    drop(ada);
    assert_eq!(names(&next_frame(&mut bob).await), vec!["Bob"]);
}

#[actix_web::test]
async fn test_silent_client_times_out() {
    let mut settings = Settings::new_for_test().expect("Failed to load test config");
    settings.websocket.heartbeat_interval_secs = 1;
    settings.websocket.client_timeout_secs = 2;
    let url = spawn_relay_with(settings);

    // Ada is never polled again after registering, so she never answers
    // the server's pings.
    let mut ada = connect(&url).await;
    register(&mut ada, "Ada", "a@x.com").await;

    let mut bob = connect(&url).await;
    register(&mut bob, "Bob", "b@x.com").await;
    assert_eq!(names(&next_frame(&mut bob).await), vec!["Ada", "Bob"]);

    // Reading keeps Bob answering pings while Ada's timeout runs out.
    let frame = next_frame_within(&mut bob, Duration::from_secs(10)).await;
    assert_eq!(names(&frame), vec!["Bob"]);

    drop(ada);
}

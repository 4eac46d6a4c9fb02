use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sio_server::{Connection, ConnectionContext, InboundMessage, RouterSettings};
use sio_test_utils::TestServer;

struct EchoConnection;

#[async_trait]
impl Connection for EchoConnection {
    async fn on_message(&self, ctx: &ConnectionContext, message: InboundMessage) {
        if let InboundMessage::Text(text) = message {
            ctx.send(Value::String(text), None, false).await;
        }
    }
}

fn echo_factory() -> Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync> {
    Arc::new(|| Box::new(EchoConnection) as Box<dyn Connection>)
}

#[tokio::test]
async fn handshake_descriptor_matches_the_documented_shape() {
    let server = TestServer::start(RouterSettings::default(), echo_factory()).await;
    let body = reqwest::get(format!("{}/socket.io/1/", server.http_base()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let parts: Vec<&str> = body.splitn(4, ':').collect();
    assert_eq!(parts.len(), 4, "descriptor {body:?} did not have four fields");
    assert!(
        !parts[0].is_empty() && parts[0].chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        "session id {:?} did not match [a-zA-Z0-9_-]+",
        parts[0]
    );
    assert_eq!(parts[1], "17");
    assert_eq!(parts[2], "25");
    assert_eq!(parts[3], "websocket,flashsocket,xhr-polling,jsonp-polling,htmlfile");
}

#[tokio::test]
async fn first_xhr_poll_returns_the_connect_packet_then_echoes_a_posted_message() {
    let server = TestServer::start(RouterSettings::default(), echo_factory()).await;
    let client = reqwest::Client::new();

    let descriptor = client
        .get(format!("{}/socket.io/1/", server.http_base()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let sid = descriptor.split(':').next().unwrap();

    let poll_url = format!("{}/socket.io/1/xhr-polling/{sid}", server.http_base());

    let first_poll = client.get(&poll_url).send().await.unwrap().text().await.unwrap();
    assert_eq!(first_poll, "1::");

    let post_response = client.post(&poll_url).body("3:::hello").send().await.unwrap();
    assert_eq!(post_response.status(), reqwest::StatusCode::OK);
    assert_eq!(post_response.text().await.unwrap(), "");

    let second_poll = client.get(&poll_url).send().await.unwrap().text().await.unwrap();
    assert_eq!(second_poll, "3:::hello");
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sio_protocol::EventArgs;
use sio_server::{Connection, ConnectionContext, InboundMessage, RouterSettings};
use sio_test_utils::TestServer;

struct RecordingConnection {
    positional_calls: Arc<AtomicUsize>,
    named_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn on_message(&self, _ctx: &ConnectionContext, _message: InboundMessage) {}

    async fn on_event(&self, _ctx: &ConnectionContext, name: &str, args: EventArgs) -> Option<Value> {
        assert_eq!(name, "t");
        match &args {
            EventArgs::Positional(values) => {
                assert_eq!(values, &vec![serde_json::json!(10), serde_json::json!(20)]);
                self.positional_calls.fetch_add(1, Ordering::SeqCst);
                None
            }
            EventArgs::Named(map) => {
                assert_eq!(map.get("a"), Some(&serde_json::json!(1)));
                self.named_calls.fetch_add(1, Ordering::SeqCst);
                Some(serde_json::json!("handled"))
            }
        }
    }
}

#[tokio::test]
async fn positional_args_dispatch_without_ack_kwargs_dispatch_with_ack() {
    let positional_calls = Arc::new(AtomicUsize::new(0));
    let named_calls = Arc::new(AtomicUsize::new(0));
    let (p, n) = (Arc::clone(&positional_calls), Arc::clone(&named_calls));
    let factory: Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync> = Arc::new(move || {
        Box::new(RecordingConnection { positional_calls: Arc::clone(&p), named_calls: Arc::clone(&n) })
            as Box<dyn Connection>
    });

    let server = TestServer::start(RouterSettings::default(), factory).await;
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

    // Drain the initial connect packet.
    client.get(&poll_url).send().await.unwrap();

    client
        .post(&poll_url)
        .body("5:::{\"name\":\"t\",\"args\":[10,20]}")
        .send()
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(positional_calls.load(Ordering::SeqCst), 1);
    // No ack_id, so nothing should be queued for this poll.
    let after_positional = client.get(&poll_url).send().await.unwrap().text().await.unwrap();
    assert_eq!(after_positional, "");

    client
        .post(&poll_url)
        .body("5:2+::{\"name\":\"t\",\"args\":[{\"a\":1}]}")
        .send()
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(named_calls.load(Ordering::SeqCst), 1);

    let ack = client.get(&poll_url).send().await.unwrap().text().await.unwrap();
    assert_eq!(ack, "6:::2+[\"handled\"]");
}

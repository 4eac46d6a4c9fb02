use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use sio_server::{AckCallback, Connection, ConnectionContext, InboundMessage, RouterSettings};
use sio_test_utils::TestServer;

/// On receiving any text message, replies with an ack-requesting "yes" and
/// records every ack it gets back.
struct AckingConnection {
    acks: Arc<Mutex<Vec<(Value, Option<Value>)>>>,
}

#[async_trait]
impl Connection for AckingConnection {
    async fn on_message(&self, ctx: &ConnectionContext, message: InboundMessage) {
        if let InboundMessage::Text(_) = message {
            let acks = Arc::clone(&self.acks);
            let callback: AckCallback = Box::new(move |original, response| {
                acks.lock().unwrap().push((original, response));
            });
            ctx.send(Value::String("yes".to_owned()), Some(callback), false).await;
        }
    }
}

#[tokio::test]
async fn message_ack_id_is_acked_and_server_ack_request_round_trips() {
    let acks = Arc::new(Mutex::new(Vec::new()));
    let acks_for_factory = Arc::clone(&acks);
    let factory: Arc<dyn Fn() -> Box<dyn Connection> + Send + Sync> =
        Arc::new(move || Box::new(AckingConnection { acks: Arc::clone(&acks_for_factory) }) as Box<dyn Connection>);

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

    // Consume the initial connect packet.
    let first = client.get(&poll_url).send().await.unwrap().text().await.unwrap();
    assert_eq!(first, "1::");

    client.post(&poll_url).body("3:7::abc").send().await.unwrap();

    let body = client.get(&poll_url).send().await.unwrap().text().await.unwrap();
    let packets = sio_protocol::decode_frames(&body).unwrap();
    assert!(packets.contains(&"3:1::yes".to_owned()), "expected server's ack-requesting send, got {packets:?}");
    assert!(packets.contains(&"6:::7".to_owned()), "expected echo-ack for inbound mid 7, got {packets:?}");

    client.post(&poll_url).body("6:::1").send().await.unwrap();

    // Give the in-process dispatch a moment to run the callback.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let recorded = acks.lock().unwrap().clone();
    assert_eq!(recorded, vec![(Value::String("yes".to_owned()), None)]);
}

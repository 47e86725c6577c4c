// These tests need a running RabbitMQ instance. The broker location is taken
// from RABBITMQ_HOST / RABBITMQ_PORT / RABBITMQ_USER / RABBITMQ_PASSWORD and
// defaults to guest@localhost:5672.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futbolin_messaging::services::{EchoResponder, EchoService, Ping, PingReceiver, PingService};
use futbolin_messaging::{MessageSender, MessagingConfig, MessagingFactory, RequestEnvelope};
use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

fn broker_config() -> MessagingConfig {
    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());

    MessagingConfig::new(
        env("RABBITMQ_HOST", "localhost"),
        env("RABBITMQ_PORT", "5672").parse().expect("RABBITMQ_PORT must be a port number"),
        env("RABBITMQ_USER", "guest"),
        env("RABBITMQ_PASSWORD", "guest"),
    )
}

fn unique_queue(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_rpc_style() {
    let factory = MessagingFactory::new(broker_config());
    let queue = unique_queue("echo");

    let _responder = EchoResponder::start(&factory, &queue).await.unwrap();
    let service = EchoService::new(&factory, &queue, WAIT).await.unwrap();

    let response = service.echo("Hello, world").await.unwrap();

    assert_eq!(response, "Response to Hello, world");
    factory.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_response_correlation_id_matches_request() {
    let factory = MessagingFactory::new(broker_config());
    let request_queue = unique_queue("requests");

    let receiver = factory.message_receiver(&request_queue).await.unwrap();
    let _listener = receiver.spawn(|envelope: RequestEnvelope| async move {
        let answer = format!("re: {}", String::from_utf8_lossy(&envelope.message));
        Ok::<_, anyhow::Error>(Some(answer.into_bytes()))
    });

    let responses = factory.temporary_queue().await.unwrap();
    let mut consumer = responses.consume("test").await.unwrap();

    let sender = factory.message_sender(&request_queue).await.unwrap();
    let request = RequestEnvelope::request("question", responses.name());
    sender.send(request.clone()).await.unwrap();

    let delivery = timeout(WAIT, consumer.next())
        .await
        .expect("No response within time")
        .expect("Consumer ended")
        .unwrap();
    delivery.ack(BasicAckOptions::default()).await.unwrap();

    let response = RequestEnvelope::from(&delivery);
    assert_eq!(response.correlation_id, request.correlation_id);
    assert_eq!(response.response_queue_name, None);
    assert_eq!(response.message, b"re: question".to_vec());

    factory.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_fire_and_forget_style() {
    let factory = MessagingFactory::new(broker_config());
    let queue = unique_queue("ping");

    let mut receiver = PingReceiver::start(&factory, &queue).await.unwrap();
    let service = PingService::new(&factory, &queue).await.unwrap();

    service.ping("Hello, world").await.unwrap();

    let envelope = timeout(WAIT, receiver.next())
        .await
        .expect("No ping within time")
        .expect("Receiver stopped");

    assert!(envelope.correlation_id.is_none());
    assert!(envelope.response_queue_name.is_none());
    assert_eq!(Ping::decode(&envelope).unwrap().text, "Hello, world");

    factory.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_temporary_queue_is_broker_named() {
    let factory = MessagingFactory::new(broker_config());

    let first = factory.temporary_queue().await.unwrap();
    let second = factory.temporary_queue().await.unwrap();

    assert!(!first.name().is_empty());
    assert_ne!(first.name(), second.name());
    assert_ne!(first.connection_id(), second.connection_id());

    factory.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_cleanup_closes_every_connection() {
    let factory = MessagingFactory::new(broker_config());

    let _queue = factory.queue(&unique_queue("cleanup")).await.unwrap();
    let _temporary = factory.temporary_queue().await.unwrap();
    assert_eq!(factory.open_connections(), 2);

    factory.cleanup().await;

    assert_eq!(factory.open_connections(), 0);
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_rpc_timeout_without_responder() {
    let factory = MessagingFactory::new(broker_config());
    let client = factory
        .rpc_client(&unique_queue("nobody-home"), Duration::from_millis(500))
        .await
        .unwrap();

    let err = client.call("anyone?").await.unwrap_err();

    assert!(matches!(
        err,
        futbolin_messaging::MessagingError::ResponseTimeout { .. }
    ));
    factory.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_closing_a_queue_closes_its_connection() {
    let factory = MessagingFactory::new(broker_config());

    let queue = factory.queue(&unique_queue("closing")).await.unwrap();
    let temporary = factory.temporary_queue().await.unwrap();
    assert_eq!(factory.open_connections(), 2);

    queue.close().await.unwrap();
    assert_eq!(factory.open_connections(), 1);
    temporary.close().await.unwrap();
    assert_eq!(factory.open_connections(), 0);
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_dropping_a_queue_unregisters_its_connection() {
    let factory = MessagingFactory::new(broker_config());

    let queue = factory.queue(&unique_queue("dropping")).await.unwrap();
    assert_eq!(factory.open_connections(), 1);

    drop(queue);

    assert_eq!(factory.open_connections(), 0);
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_closing_rpc_client_closes_both_connections() {
    let factory = MessagingFactory::new(broker_config());

    let client = factory
        .rpc_client(&unique_queue("rpc-close"), WAIT)
        .await
        .unwrap();
    assert_eq!(factory.open_connections(), 2);

    client.close().await.unwrap();

    assert_eq!(factory.open_connections(), 0);
}

#[tokio::test]
#[ignore] // Requires a running RabbitMQ instance
async fn test_failed_message_is_not_redelivered() {
    let factory = MessagingFactory::new(broker_config());
    let queue = unique_queue("failing");
    let attempts = Arc::new(AtomicUsize::new(0));

    let receiver = factory.message_receiver(&queue).await.unwrap();
    let counter = Arc::clone(&attempts);
    let _listener = receiver.spawn(move |_envelope: RequestEnvelope| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Option<Vec<u8>>, _>(anyhow::anyhow!("cannot handle this"))
        }
    });

    let sender = factory.message_sender(&queue).await.unwrap();
    sender.send(RequestEnvelope::fire_and_forget("boom")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    factory.cleanup().await;
}

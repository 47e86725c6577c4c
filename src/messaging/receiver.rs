use std::future::Future;

use futures_lite::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicRejectOptions},
    Channel,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::envelope::RequestEnvelope;
use super::error::Result;
use super::queue::{publish_to, Queue};

/// Consumes the queue it was created for and hands every message to a handler.
///
/// A handler returning `Some(bytes)` answers the request: the bytes are sent to
/// the request's reply queue under the request's correlation id.
#[derive(Debug)]
pub struct DefaultMessageReceiver {
    queue: Queue,
}

impl DefaultMessageReceiver {
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Runs until the consumer stream ends or the channel goes away.
    pub async fn listen<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(RequestEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Vec<u8>>>> + Send + 'static,
    {
        let mut consumer = self.queue.consume("receiver").await?;
        let channel = self.queue.channel();

        info!(queue = %self.queue.name(), "Receiver listening");

        while let Some(delivery_result) = consumer.next().await {
            match delivery_result {
                Ok(delivery) => process_delivery(channel, delivery, &handler).await,
                Err(e) => {
                    error!(queue = %self.queue.name(), error = %e, "Error receiving message");
                    if !channel.status().connected() {
                        warn!(queue = %self.queue.name(), "Channel disconnected, receiver stops");
                        break;
                    }
                }
            }
        }

        info!(queue = %self.queue.name(), "Receiver stopped");
        Ok(())
    }

    /// Runs [`listen`](Self::listen) on its own task.
    pub fn spawn<F, Fut>(self, handler: F) -> JoinHandle<Result<()>>
    where
        F: Fn(RequestEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Vec<u8>>>> + Send + 'static,
    {
        tokio::spawn(async move { self.listen(handler).await })
    }
}

/// What happens to a delivery once its handler has run.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Ack,
    /// Publish `envelope` to `queue`, then settle with [`after_reply`].
    Reply {
        queue: String,
        envelope: RequestEnvelope,
    },
    Reject {
        requeue: bool,
    },
}

fn disposition(
    request: &RequestEnvelope,
    outcome: anyhow::Result<Option<Vec<u8>>>,
) -> Disposition {
    match outcome {
        Ok(Some(response)) => match request.reply(response) {
            Some((queue, envelope)) => Disposition::Reply { queue, envelope },
            None => {
                warn!("Handler answered a message that expects no response, dropping the answer");
                Disposition::Ack
            }
        },
        Ok(None) => Disposition::Ack,
        Err(e) => {
            error!(correlation_id = ?request.correlation_id, error = %e, "Error processing message");
            Disposition::Reject { requeue: false }
        }
    }
}

/// A reply that could not be sent puts the request back for another try.
fn after_reply(published: bool) -> Disposition {
    if published {
        Disposition::Ack
    } else {
        Disposition::Reject { requeue: true }
    }
}

async fn process_delivery<F, Fut>(channel: &Channel, delivery: Delivery, handler: &F)
where
    F: Fn(RequestEnvelope) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<Vec<u8>>>>,
{
    let envelope = RequestEnvelope::from(&delivery);
    debug!(correlation_id = ?envelope.correlation_id, bytes = envelope.message.len(), "Received message");

    let outcome = handler(envelope.clone()).await;
    let mut next = disposition(&envelope, outcome);

    if let Disposition::Reply { queue, envelope: reply } = &next {
        let published = match publish_to(channel, queue, reply).await {
            Ok(()) => true,
            Err(e) => {
                error!(correlation_id = ?reply.correlation_id, error = %e, "Failed to send response");
                false
            }
        };
        next = after_reply(published);
    }

    match next {
        Disposition::Ack => ack(&delivery).await,
        Disposition::Reject { requeue } => reject(&delivery, requeue).await,
        Disposition::Reply { .. } => {}
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        error!("Failed to acknowledge message: {}", e);
    }
}

async fn reject(delivery: &Delivery, requeue: bool) {
    if let Err(e) = delivery.reject(BasicRejectOptions { requeue }).await {
        error!("Failed to reject message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_failure_is_rejected_without_requeue() {
        let request = RequestEnvelope::request("question", "replies");

        let next = disposition(&request, Err(anyhow::anyhow!("broken handler")));

        assert_eq!(next, Disposition::Reject { requeue: false });
    }

    #[test]
    fn test_handled_message_without_answer_is_acked() {
        let request = RequestEnvelope::request("question", "replies");
        assert_eq!(disposition(&request, Ok(None)), Disposition::Ack);

        let ping = RequestEnvelope::fire_and_forget("ping");
        assert_eq!(disposition(&ping, Ok(None)), Disposition::Ack);
    }

    #[test]
    fn test_answer_to_fire_and_forget_is_dropped() {
        let ping = RequestEnvelope::fire_and_forget("ping");

        let next = disposition(&ping, Ok(Some(b"pong".to_vec())));

        assert_eq!(next, Disposition::Ack);
    }

    #[test]
    fn test_answered_request_replies_under_same_correlation_id() {
        let request = RequestEnvelope::request("question", "replies");

        let next = disposition(&request, Ok(Some(b"answer".to_vec())));

        match next {
            Disposition::Reply { queue, envelope } => {
                assert_eq!(queue, "replies");
                assert_eq!(envelope.correlation_id, request.correlation_id);
                assert_eq!(envelope.response_queue_name, None);
                assert_eq!(envelope.message, b"answer".to_vec());
            }
            other => panic!("Expected a reply, got {:?}", other),
        }
    }

    #[test]
    fn test_unsent_reply_requeues_the_request() {
        assert_eq!(after_reply(true), Disposition::Ack);
        assert_eq!(after_reply(false), Disposition::Reject { requeue: true });
    }
}

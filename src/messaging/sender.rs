use async_trait::async_trait;
use tracing::debug;

use super::envelope::RequestEnvelope;
use super::error::Result;
use super::queue::Queue;

/// Something messages can be sent through.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, envelope: RequestEnvelope) -> Result<()>;
}

/// Sends every message to the queue it was created for.
#[derive(Debug)]
pub struct DefaultMessageSender {
    queue: Queue,
}

impl DefaultMessageSender {
    pub fn new(queue: Queue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }
}

#[async_trait]
impl MessageSender for DefaultMessageSender {
    async fn send(&self, envelope: RequestEnvelope) -> Result<()> {
        debug!(
            queue = %self.queue.name(),
            fire_and_forget = !envelope.expects_response(),
            "Sending message"
        );
        self.queue.publish(&envelope).await
    }
}

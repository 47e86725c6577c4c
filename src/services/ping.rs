use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::messaging::{
    DefaultMessageSender, MessageSender, MessagingFactory, RequestEnvelope, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl Ping {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    pub fn decode(envelope: &RequestEnvelope) -> Result<Self> {
        Ok(serde_json::from_slice(&envelope.message)?)
    }
}

/// Sends pings without waiting for anything in return.
pub struct PingService {
    sender: DefaultMessageSender,
}

impl PingService {
    pub async fn new(factory: &MessagingFactory, queue_name: &str) -> Result<Self> {
        Ok(Self {
            sender: factory.message_sender(queue_name).await?,
        })
    }

    pub async fn ping(&self, text: &str) -> Result<()> {
        let payload = serde_json::to_vec(&Ping::new(text))?;
        self.sender
            .send(RequestEnvelope::fire_and_forget(payload))
            .await
    }
}

/// Collects every envelope arriving on the ping queue.
pub struct PingReceiver {
    queue_name: String,
    received: mpsc::UnboundedReceiver<RequestEnvelope>,
    handle: JoinHandle<Result<()>>,
}

impl PingReceiver {
    pub async fn start(factory: &MessagingFactory, queue_name: &str) -> Result<Self> {
        let receiver = factory.message_receiver(queue_name).await?;
        let (tx, received) = mpsc::unbounded_channel();

        let handle = receiver.spawn(move |envelope: RequestEnvelope| {
            let tx = tx.clone();
            async move {
                match Ping::decode(&envelope) {
                    Ok(ping) => info!("Received ping '{}' sent at {}", ping.text, ping.sent_at),
                    Err(e) => warn!(error = %e, "Received something that is not a ping"),
                }
                tx.send(envelope)
                    .map_err(|_| anyhow!("Ping receiver is no longer collecting"))?;
                Ok::<Option<Vec<u8>>, anyhow::Error>(None)
            }
        });

        info!(queue = %queue_name, "Ping receiver started");
        Ok(Self {
            queue_name: queue_name.to_string(),
            received,
            handle,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Waits for the next envelope. `None` once the receiver has stopped.
    pub async fn next(&mut self) -> Option<RequestEnvelope> {
        self.received.recv().await
    }
}

impl Drop for PingReceiver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_lite::StreamExt;
use lapin::{options::BasicAckOptions, Channel, Consumer};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::envelope::RequestEnvelope;
use super::error::{MessagingError, Result};
use super::queue::Queue;

type ResponseCallback = oneshot::Sender<Vec<u8>>;

/// Requests still waiting for their response, keyed by correlation id.
#[derive(Clone, Default)]
pub struct PendingReplies {
    callbacks: Arc<Mutex<HashMap<String, ResponseCallback>>>,
}

impl PendingReplies {
    pub fn register(&self, correlation_id: &str) -> Result<oneshot::Receiver<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.callbacks
            .lock()
            .map_err(|_| MessagingError::LockError)?
            .insert(correlation_id.to_string(), tx);
        Ok(rx)
    }

    /// Hands the response to whoever waits for `correlation_id`. Returns
    /// `false` when nobody does (unknown id, timed out, or caller gone).
    pub fn complete(&self, correlation_id: &str, response: Vec<u8>) -> bool {
        let callback = match self.callbacks.lock() {
            Ok(mut callbacks) => callbacks.remove(correlation_id),
            Err(poisoned) => poisoned.into_inner().remove(correlation_id),
        };

        match callback {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn forget(&self, correlation_id: &str) {
        match self.callbacks.lock() {
            Ok(mut callbacks) => callbacks.remove(correlation_id),
            Err(poisoned) => poisoned.into_inner().remove(correlation_id),
        };
    }

    pub fn len(&self) -> usize {
        match self.callbacks.lock() {
            Ok(callbacks) => callbacks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drops the pending entry for a call however the call ends, including when
/// the caller stops polling it.
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    correlation_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.correlation_id);
    }
}

/// Request/response over two queues: requests go to a shared, named queue and
/// responses come back on a temporary queue owned by this client.
pub struct RpcClient {
    requests: Queue,
    responses: Queue,
    pending: PendingReplies,
    timeout: Duration,
    listener: JoinHandle<()>,
}

impl RpcClient {
    pub async fn new(requests: Queue, responses: Queue, timeout: Duration) -> Result<Self> {
        let pending = PendingReplies::default();

        // Consume before the first request goes out so no response is missed
        let consumer = responses.consume("rpc-client").await?;
        let listener = tokio::spawn(dispatch_responses(
            responses.channel().clone(),
            responses.name().to_string(),
            consumer,
            pending.clone(),
        ));

        debug!(
            request_queue = %requests.name(),
            response_queue = %responses.name(),
            "RPC client ready"
        );

        Ok(Self {
            requests,
            responses,
            pending,
            timeout,
            listener,
        })
    }

    pub fn response_queue_name(&self) -> &str {
        self.responses.name()
    }

    pub fn request_queue_name(&self) -> &str {
        self.requests.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `message` and waits for the response carrying the same
    /// correlation id.
    pub async fn call(&self, message: impl Into<Vec<u8>>) -> Result<Vec<u8>> {
        let correlation_id = Uuid::new_v4().to_string();
        let envelope = RequestEnvelope::new(
            Some(correlation_id.clone()),
            Some(self.responses.name().to_string()),
            message,
        );

        let rx = self.pending.register(&correlation_id)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            correlation_id: &correlation_id,
        };
        self.requests.publish(&envelope).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(MessagingError::ResponseChannelClosed),
            Err(_) => {
                warn!(correlation_id = %correlation_id, "RPC request timed out after {:?}", self.timeout);
                Err(MessagingError::ResponseTimeout {
                    correlation_id: correlation_id.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Stops listening for responses and closes both queues with their
    /// connections.
    pub async fn close(self) -> Result<()> {
        self.listener.abort();
        let requests = self.requests.close().await;
        let responses = self.responses.close().await;
        requests.and(responses)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn dispatch_responses(
    channel: Channel,
    queue_name: String,
    mut consumer: Consumer,
    pending: PendingReplies,
) {
    while let Some(delivery_result) = consumer.next().await {
        match delivery_result {
            Ok(delivery) => {
                let envelope = RequestEnvelope::from(&delivery);
                match envelope.correlation_id {
                    Some(correlation_id) => {
                        if !pending.complete(&correlation_id, envelope.message) {
                            warn!(correlation_id = %correlation_id, "Response for an unknown or expired request");
                        }
                    }
                    None => warn!(queue = %queue_name, "Response without correlation id"),
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!("Failed to acknowledge response: {}", e);
                }
            }
            Err(e) => {
                error!(queue = %queue_name, error = %e, "Error receiving response");
                if !channel.status().connected() {
                    break;
                }
            }
        }
    }
}

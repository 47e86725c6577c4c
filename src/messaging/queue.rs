use std::fmt;
use std::sync::{Arc, Weak};

use amq_protocol_types::FieldTable;
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions},
    Channel, Connection, Consumer,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::envelope::RequestEnvelope;
use super::error::{MessagingError, Result};
use super::factory::Registry;

/// A declared queue together with the channel and connection it was declared on.
///
/// Every `Queue` owns its own connection and channel, and it is deliberately
/// not `Clone`: a channel should stay with a single owner. Closing or dropping
/// the queue closes its connection and takes it off the factory's registry.
pub struct Queue {
    channel: Channel,
    name: String,
    connection_id: u64,
    connection: Arc<Connection>,
    registry: Weak<Registry>,
}

impl Queue {
    pub(crate) fn new(
        channel: Channel,
        name: String,
        connection_id: u64,
        connection: Arc<Connection>,
        registry: Weak<Registry>,
    ) -> Self {
        debug!(
            queue = %name,
            connection_id,
            channel_id = channel.id(),
            "Queue ready"
        );
        Self {
            channel,
            name,
            connection_id,
            connection,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Publishes on the default exchange, routed by this queue's name.
    pub async fn publish(&self, envelope: &RequestEnvelope) -> Result<()> {
        publish_to(&self.channel, &self.name, envelope).await
    }

    pub async fn consume(&self, tag_prefix: &str) -> Result<Consumer> {
        let consumer_tag = format!("{}-{}", tag_prefix, Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(
                &self.name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::ConsumeError {
                queue: self.name.clone(),
                source: e,
            })?;

        info!(queue = %self.name, consumer_tag = %consumer_tag, "Started consuming");
        Ok(consumer)
    }

    /// Closes the channel and the connection behind it.
    pub async fn close(&self) -> Result<()> {
        self.unregister();

        if self.channel.status().connected() {
            self.channel
                .close(200, "Closing queue")
                .await
                .map_err(MessagingError::ChannelError)?;
        }
        if self.connection.status().connected() {
            info!(connection_id = self.connection_id, "Closing connection");
            self.connection
                .close(200, "Closing queue")
                .await
                .map_err(MessagingError::ConnectionError)?;
        }
        Ok(())
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            match registry.lock() {
                Ok(mut connections) => connections.remove(&self.connection_id),
                Err(poisoned) => poisoned.into_inner().remove(&self.connection_id),
            };
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.unregister();

        if !self.connection.status().connected() {
            return;
        }
        // Closing needs a runtime; without one the socket goes when the process does
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let connection = Arc::clone(&self.connection);
            let id = self.connection_id;
            handle.spawn(async move { silently_close_connection(id, &connection).await });
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("connection_id", &self.connection_id)
            .field("channel_id", &self.channel.id())
            .finish()
    }
}

pub(crate) async fn silently_close_connection(id: u64, connection: &Connection) {
    if !connection.status().connected() {
        debug!(connection_id = id, "Connection is already closed");
        return;
    }

    info!(connection_id = id, "Closing connection");
    if let Err(e) = connection.close(200, "Shutting down").await {
        error!(connection_id = id, error = %e, "Could not properly close connection");
    }
}

pub(crate) async fn publish_to(
    channel: &Channel,
    routing_key: &str,
    envelope: &RequestEnvelope,
) -> Result<()> {
    let properties = envelope
        .properties()
        .with_timestamp(chrono::Utc::now().timestamp() as u64);

    let publish_error = |e| MessagingError::PublishError {
        queue: routing_key.to_string(),
        source: e,
    };

    channel
        .basic_publish(
            "",
            routing_key,
            BasicPublishOptions::default(),
            &envelope.message,
            properties,
        )
        .await
        .map_err(publish_error)?
        .await
        .map_err(publish_error)?;

    debug!(
        queue = %routing_key,
        correlation_id = ?envelope.correlation_id,
        bytes = envelope.message.len(),
        "Published message"
    );
    Ok(())
}

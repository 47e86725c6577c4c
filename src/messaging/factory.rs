use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amq_protocol_types::FieldTable;
use lapin::{options::QueueDeclareOptions, Channel, Connection, ConnectionProperties};
use tracing::{debug, error, info};

use super::config::MessagingConfig;
use super::error::{MessagingError, Result};
use super::queue::{silently_close_connection, Queue};
use super::receiver::DefaultMessageReceiver;
use super::rpc::RpcClient;
use super::sender::DefaultMessageSender;

/// Connections opened by a factory, by id.
pub(crate) type Registry = Mutex<HashMap<u64, Arc<Connection>>>;

/// Hands out queues, senders and receivers, each on a connection and channel
/// of its own.
///
/// Every opened connection is tracked until its [`Queue`] is closed or dropped,
/// [`cleanup`](Self::cleanup) closes it, or the broker reports it as failed.
/// This is not the most economical way to use connections, but a channel never
/// ends up shared between owners.
pub struct MessagingFactory {
    config: MessagingConfig,
    opened_connections: Arc<Registry>,
    connection_id: AtomicU64,
}

impl MessagingFactory {
    pub fn new(config: MessagingConfig) -> Self {
        info!("Configuring RabbitMQ connection using {}", config);
        Self {
            config,
            opened_connections: Arc::new(Mutex::new(HashMap::new())),
            connection_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Opens a fresh connection and returns a channel on it.
    pub async fn create_channel(&self) -> Result<Channel> {
        self.open_channel().await.map(|(_, _, channel)| channel)
    }

    async fn open_channel(&self) -> Result<(u64, Arc<Connection>, Channel)> {
        let timeout = self.config.connect_timeout();
        let connection = tokio::time::timeout(
            timeout,
            Connection::connect_uri(self.config.amqp_uri(), ConnectionProperties::default()),
        )
        .await
        .map_err(|_| {
            error!(host = %self.config.host, "Connection to RabbitMQ timed out after {:?}", timeout);
            MessagingError::ConnectTimeout(timeout)
        })?
        .map_err(|e| {
            error!(error = %e, "Could not open connection to RabbitMQ");
            MessagingError::ConnectionError(e)
        })?;

        let id = self.connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = Arc::new(connection);
        self.track(id, &connection)?;
        info!(connection_id = id, "Opened RabbitMQ connection");

        let channel = connection.create_channel().await.map_err(|e| {
            error!(connection_id = id, error = %e, "Could not open channel");
            MessagingError::ChannelError(e)
        })?;

        Ok((id, connection, channel))
    }

    fn track(&self, id: u64, connection: &Arc<Connection>) -> Result<()> {
        self.opened_connections
            .lock()
            .map_err(|_| MessagingError::LockError)?
            .insert(id, Arc::clone(connection));

        let registry = Arc::downgrade(&self.opened_connections);
        connection.on_error(move |err| {
            debug!(connection_id = id, "Closing connection due to {}", err);
            if let Some(registry) = registry.upgrade() {
                if let Ok(mut connections) = registry.lock() {
                    connections.remove(&id);
                }
            }
        });

        Ok(())
    }

    /// Declares a named, durable, non-exclusive, permanent queue. Meant for
    /// request queues that may already exist and be shared with other
    /// consumers.
    pub async fn queue(&self, name: &str) -> Result<Queue> {
        let (connection_id, connection, channel) = self.open_channel().await?;

        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                error!(queue = %name, error = %e, "Could not declare queue");
                MessagingError::QueueError {
                    queue: name.to_string(),
                    source: e,
                }
            })?;

        Ok(Queue::new(
            channel,
            name.to_string(),
            connection_id,
            connection,
            Arc::downgrade(&self.opened_connections),
        ))
    }

    /// Declares a broker-named queue that is exclusive to this connection,
    /// non-durable and removed when the connection goes away. Meant for
    /// response queues.
    pub async fn temporary_queue(&self) -> Result<Queue> {
        let (connection_id, connection, channel) = self.open_channel().await?;

        let declared = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Could not declare a temporary queue");
                MessagingError::QueueError {
                    queue: String::new(),
                    source: e,
                }
            })?;

        Ok(Queue::new(
            channel,
            declared.name().as_str().to_string(),
            connection_id,
            connection,
            Arc::downgrade(&self.opened_connections),
        ))
    }

    pub async fn message_sender(&self, queue_name: &str) -> Result<DefaultMessageSender> {
        Ok(DefaultMessageSender::new(self.queue(queue_name).await?))
    }

    pub async fn message_receiver(&self, queue_name: &str) -> Result<DefaultMessageReceiver> {
        Ok(DefaultMessageReceiver::new(self.queue(queue_name).await?))
    }

    /// RPC client sending to `queue_name` and awaiting replies on a temporary
    /// queue of its own.
    pub async fn rpc_client(&self, queue_name: &str, timeout: Duration) -> Result<RpcClient> {
        let requests = self.queue(queue_name).await?;
        let responses = self.temporary_queue().await?;
        RpcClient::new(requests, responses, timeout).await
    }

    pub fn open_connections(&self) -> usize {
        match self.opened_connections.lock() {
            Ok(connections) => connections.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Closes every tracked connection. Failures are logged, never returned.
    pub async fn cleanup(&self) {
        let connections: Vec<(u64, Arc<Connection>)> = match self.opened_connections.lock() {
            Ok(mut connections) => connections.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };

        for (id, connection) in connections {
            silently_close_connection(id, &connection).await;
        }
    }
}

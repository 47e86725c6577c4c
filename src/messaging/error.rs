// src/messaging/error.rs
use lapin::Error as LapinError;
use std::time::Duration;
use thiserror::Error;

/// The single error type for anything that goes wrong while configuring
/// messaging, publishing a message or receiving one.
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Could not open connection to RabbitMQ: {0}")]
    ConnectionError(#[source] LapinError),

    #[error("Connection to RabbitMQ timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Channel error: {0}")]
    ChannelError(#[source] LapinError),

    #[error("Could not declare queue '{queue}': {source}")]
    QueueError {
        queue: String,
        #[source]
        source: LapinError,
    },

    #[error("Failed to publish message to '{queue}': {source}")]
    PublishError {
        queue: String,
        #[source]
        source: LapinError,
    },

    #[error("Failed to consume from '{queue}': {source}")]
    ConsumeError {
        queue: String,
        #[source]
        source: LapinError,
    },

    #[error("Failed to acknowledge message: {0}")]
    AckError(#[source] LapinError),

    #[error("Message serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("No response for request {correlation_id} within {timeout:?}")]
    ResponseTimeout {
        correlation_id: String,
        timeout: Duration,
    },

    #[error("Response channel was closed unexpectedly")]
    ResponseChannelClosed,

    #[error("Connection registry lock acquisition failed")]
    LockError,
}

pub type Result<T> = std::result::Result<T, MessagingError>;

// src/messaging/mod.rs
// RabbitMQ plumbing: connections, queues, envelopes and the send/receive helpers on top

pub mod config;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod queue;
pub mod receiver;
pub mod rpc;
pub mod sender;

pub use config::MessagingConfig;
pub use envelope::RequestEnvelope;
pub use error::{MessagingError, Result};
pub use factory::MessagingFactory;
pub use queue::Queue;
pub use receiver::DefaultMessageReceiver;
pub use rpc::{PendingReplies, RpcClient};
pub use sender::{DefaultMessageSender, MessageSender};

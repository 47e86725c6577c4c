//! Messaging backbone of the futbolin web application: loads configuration,
//! opens RabbitMQ connections and offers request/response and
//! fire-and-forget helpers on top of `lapin`.

pub mod config;
pub mod messaging;
pub mod services;

pub use config::{ConfigError, PropertiesConfig, CONFIG_PATH_VARIABLE};
pub use messaging::{
    DefaultMessageReceiver, DefaultMessageSender, MessageSender, MessagingConfig, MessagingError,
    MessagingFactory, Queue, RequestEnvelope, RpcClient,
};

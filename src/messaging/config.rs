use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};

use crate::config::{ConfigError, PropertiesConfig};

pub const HOST_KEY: &str = "rabbitmq.host";
pub const PORT_KEY: &str = "rabbitmq.port";
pub const USERNAME_KEY: &str = "rabbitmq.username";
pub const PASSWORD_KEY: &str = "rabbitmq.password";
pub const CONNECT_TIMEOUT_KEY: &str = "rabbitmq.connect_timeout_seconds";

/// Broker connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout_seconds: u64,
}

fn default_port() -> u16 {
    5672
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

impl MessagingConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_seconds = timeout.as_secs().max(1);
        self
    }

    /// Reads the `rabbitmq.*` keys. Host, username and password are required;
    /// the connect timeout must be at least one second.
    pub fn from_properties(properties: &PropertiesConfig) -> Result<Self, ConfigError> {
        let connect_timeout_seconds = optional_number(properties, CONNECT_TIMEOUT_KEY)?
            .unwrap_or_else(default_connect_timeout_seconds);
        if connect_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: CONNECT_TIMEOUT_KEY.to_string(),
                value: connect_timeout_seconds.to_string(),
            });
        }

        Ok(Self {
            host: required(properties, HOST_KEY)?,
            port: optional_number(properties, PORT_KEY)?.unwrap_or_else(default_port),
            username: required(properties, USERNAME_KEY)?,
            password: required(properties, PASSWORD_KEY)?,
            connect_timeout_seconds,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Connection URI on the default vhost.
    pub fn amqp_uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            ..AMQPUri::default()
        }
    }
}

fn required(properties: &PropertiesConfig, key: &str) -> Result<String, ConfigError> {
    properties
        .get_string(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

fn optional_number<T: FromStr>(
    properties: &PropertiesConfig,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match properties.get_string(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}

impl fmt::Display for MessagingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MessagingConfig(host={}, port={}, username={}, password=****)",
            self.host, self.port, self.username
        )
    }
}

impl fmt::Debug for MessagingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}

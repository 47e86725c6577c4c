// src/config.rs
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use java_properties::PropertiesError;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Environment variable holding the path of the properties file.
pub const CONFIG_PATH_VARIABLE: &str = "CONFIG_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not init configuration, no configuration file given")]
    NotSpecified,

    #[error("Could not init configuration, {path} could not be read")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not init configuration, {path} is not a valid properties file")]
    Malformed {
        path: String,
        #[source]
        source: PropertiesError,
    },

    #[error("Configuration error: {0} is required")]
    MissingKey(String),

    #[error("Configuration error: {key} has invalid value '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Flat key/value configuration read from a Java properties file.
///
/// Input is decoded as ISO-8859-1, the way `java.util.Properties` loads a
/// stream; other characters are written as `\uXXXX` escapes.
#[derive(Debug, Clone, Default)]
pub struct PropertiesConfig {
    values: HashMap<String, String>,
    source: Option<PathBuf>,
}

impl PropertiesConfig {
    /// Loads the file named by the `CONFIG_FILE` environment variable.
    pub fn load() -> Result<Self, ConfigError> {
        let location = env::var(CONFIG_PATH_VARIABLE).ok();
        Self::load_from(location.as_deref())
    }

    pub fn load_from(location: Option<&str>) -> Result<Self, ConfigError> {
        let Some(location) = location else {
            error!(
                "Could not init configuration. Specify a path to the configuration file with {}",
                CONFIG_PATH_VARIABLE
            );
            return Err(ConfigError::NotSpecified);
        };

        info!("Loading configuration file {}", location);
        let file = File::open(location).map_err(|e| {
            error!(error = %e, "Could not init configuration from {}", location);
            ConfigError::Unreadable {
                path: location.to_string(),
                source: e,
            }
        })?;

        let mut config = Self::read(BufReader::new(file), location)?;
        config.source = Some(PathBuf::from(location));
        info!(
            "{} configuration value(s) loaded from {}",
            config.len(),
            location
        );
        Ok(config)
    }

    /// Parses properties text that did not come from a file.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::read(content.as_bytes(), "<inline>")
    }

    fn read<R: Read>(input: R, origin: &str) -> Result<Self, ConfigError> {
        let values = java_properties::read(input).map_err(|e| {
            error!(error = %e, "Could not parse configuration from {}", origin);
            ConfigError::Malformed {
                path: origin.to_string(),
                source: e,
            }
        })?;

        Ok(Self {
            values,
            source: None,
        })
    }

    /// Returns the raw value, `None` for unknown keys.
    pub fn get_string(&self, key: &str) -> Option<String> {
        let value = self.values.get(key).cloned();
        if value.is_none() {
            debug!(key, "No configuration value present");
        }
        value
    }

    /// Returns the value parsed as a base-10 integer. Values that do not parse
    /// are reported and treated like missing ones.
    pub fn get_integer(&self, key: &str) -> Option<i32> {
        let value = self.get_string(key)?;
        match value.trim().parse::<i32>() {
            Ok(number) => Some(number),
            Err(_) => {
                warn!(
                    key,
                    "Value {} could not be converted to an integer", value
                );
                None
            }
        }
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Node configuration
///
/// Settings are layered with the `config` crate:
/// 1. Built-in defaults
/// 2. An optional file (`config.yml`, `config.toml`, ... chosen by extension)
/// 3. Environment variables prefixed with `FOREST_REDIS__`
///
/// # File Format
///
/// ```yaml
/// serverIdentifier: Lobby01
/// redis:
///   hostname: localhost
///   port: 6379
///   username: ~
///   password: ~
///   ssl: false
/// channels:
///   - chat
///   - staff
/// ```
///
/// # Environment Variables
///
/// - `FOREST_REDIS__SERVERIDENTIFIER`: server identifier
/// - `FOREST_REDIS__REDIS__HOSTNAME`, `..._PORT`, `..._USERNAME`,
///   `..._PASSWORD`, `..._SSL`: connection parameters
/// - `FOREST_REDIS__CHANNELS`: comma separated channel list
///
/// # Example
///
/// ```no_run
/// use forestredis_shared::config::Settings;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = Settings::load(Some(Path::new("config.yml")))?;
/// println!("Connecting to {}", settings.redis_configuration());
/// # Ok(())
/// # }
/// ```

use crate::models::RedisConfiguration;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Identifier used when the configuration does not name the node
pub const DEFAULT_SERVER_IDENTIFIER: &str = "MySuperServer1";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "FOREST_REDIS";

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Source could not be read or values have the wrong type
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Cluster-unique name of this node
    #[serde(default, rename = "serverIdentifier", alias = "serveridentifier")]
    pub server_identifier: Option<String>,

    /// Redis connection settings
    #[serde(default)]
    pub redis: RedisSettings,

    /// Channels to subscribe on startup
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Redis connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_hostname")]
    pub hostname: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub ssl: bool,
}

fn default_hostname() -> Option<String> {
    Some("localhost".to_string())
}

fn default_port() -> u16 {
    6379
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            username: None,
            password: None,
            ssl: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_identifier: None,
            redis: RedisSettings::default(),
            channels: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional file plus environment overrides
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env(path, None)
    }

    /// Parses settings from in-memory text in the given format
    pub fn parse(content: &str, format: FileFormat) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(content, format))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Loads settings, reading environment overrides from `env` instead of
    /// the process environment when given
    pub(crate) fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("channels")
                .source(env),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Server identifier, falling back to [`DEFAULT_SERVER_IDENTIFIER`]
    pub fn server_identifier(&self) -> &str {
        self.server_identifier
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_IDENTIFIER)
    }

    /// Connection parameters; an empty hostname counts as absent
    pub fn redis_configuration(&self) -> RedisConfiguration {
        let hostname = self
            .redis
            .hostname
            .clone()
            .filter(|hostname| !hostname.trim().is_empty());

        RedisConfiguration::new(
            hostname,
            self.redis.port,
            self.redis.username.clone(),
            self.redis.password.clone(),
            self.redis.ssl,
        )
    }
}

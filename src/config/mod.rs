use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::Result;
use crate::error::Error as RelayError;

mod defaults;
mod duration;
mod env;
mod raw;

use duration::HumantimeDuration;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub plugin_id: String,
    /// Base URL of the CI host, used to put stage links in the logs.
    pub ci_url: Option<Url>,
    pub settings: SettingsConfig,
    pub http: HttpSettings,
}

/// Where plugin settings come from at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsConfig {
    /// Value kept in the relay's own configuration; may be unset.
    Static { server_base_url: Option<String> },
    /// Asked from the CI host on every event.
    Host { endpoint: Url },
}

#[derive(Debug, Clone, Default)]
pub struct HttpSettings {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from a file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration file cannot be read, parsed,
    /// when environment overrides are invalid, or when the resulting values
    /// fail validation.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut raw = raw::load(path).map_err(RelayError::from)?;
        raw.apply_env_overrides().map_err(RelayError::from)?;
        raw.validate_and_build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: defaults::default_listen_addr(),
            plugin_id: defaults::default_plugin_id(),
            ci_url: None,
            settings: SettingsConfig::Static {
                server_base_url: None,
            },
            http: HttpSettings::default(),
        }
    }
}

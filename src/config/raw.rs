use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_with::serde_as;
use url::Url;

use crate::Result;
use crate::error::ConfigError;

use super::defaults::{default_listen, default_plugin_id};
use super::env::{env_duration, env_string};
use super::{Config, HttpSettings, HumantimeDuration, SettingsConfig};

pub(super) fn load(path: impl AsRef<Path>) -> std::result::Result<RawConfig, ConfigError> {
    let mut builder = ::config::Config::builder();
    let path = path.as_ref();
    builder = builder.add_source(::config::File::from(path).required(false));
    builder = builder.add_source(
        ::config::Environment::with_prefix("BADGE_RELAY")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .map_err(|err| ConfigError::Other(err.to_string()))?
        .try_deserialize()
        .map_err(|err| ConfigError::Parse(err.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub(super) server: RawServer,
    #[serde(default)]
    pub(super) plugin: RawPlugin,
    #[serde(default)]
    pub(super) settings: RawSettings,
    #[serde(default)]
    pub(super) http: RawHttp,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_listen")]
    pub(super) listen: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawPlugin {
    #[serde(default = "default_plugin_id")]
    pub(super) id: String,
    #[serde(default)]
    pub(super) ci_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawSettings {
    #[serde(default)]
    pub(super) server_base_url: Option<String>,
    #[serde(default)]
    pub(super) host_url: Option<String>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub(super) struct RawHttp {
    #[serde(default)]
    #[serde_as(as = "Option<HumantimeDuration>")]
    pub(super) timeout: Option<Duration>,
    #[serde(default)]
    #[serde_as(as = "Option<HumantimeDuration>")]
    pub(super) connect_timeout: Option<Duration>,
}

impl RawConfig {
    pub(super) fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(listen) = env_string("RELAY_LISTEN")? {
            self.server.listen = listen;
        }
        if let Some(id) = env_string("RELAY_PLUGIN_ID")? {
            self.plugin.id = id;
        }
        if let Some(url) = env_string("CI_SERVER_URL")? {
            self.plugin.ci_url = Some(url);
        }
        if let Some(url) = env_string("BADGE_SERVER_URL")? {
            self.settings.server_base_url = Some(url);
        }
        if let Some(url) = env_string("HOST_SETTINGS_URL")? {
            self.settings.host_url = Some(url);
        }
        if let Some(timeout) = env_duration("HTTP_TIMEOUT")? {
            self.http.timeout = Some(timeout);
        }
        if let Some(timeout) = env_duration("HTTP_CONNECT_TIMEOUT")? {
            self.http.connect_timeout = Some(timeout);
        }
        Ok(())
    }

    pub(super) fn validate_and_build(self) -> Result<Config> {
        let listen: SocketAddr = self.server.listen.trim().parse().map_err(
            |err: AddrParseError| ConfigError::InvalidField {
                field: "server.listen",
                message: err.to_string(),
            },
        )?;

        let plugin_id = self.plugin.id.trim().to_string();
        if plugin_id.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "plugin.id",
                message: "plugin id cannot be empty".to_string(),
            }
            .into());
        }

        let ci_url = self
            .plugin
            .ci_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(Url::parse)
            .transpose()
            .map_err(|err| ConfigError::InvalidField {
                field: "plugin.ci_url",
                message: err.to_string(),
            })?;

        let host_url = self
            .settings
            .host_url
            .filter(|url| !url.trim().is_empty());
        let settings = if let Some(raw) = host_url {
            let endpoint = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidField {
                field: "settings.host_url",
                message: err.to_string(),
            })?;
            SettingsConfig::Host { endpoint }
        } else {
            let server_base_url = self
                .settings
                .server_base_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty());
            if let Some(url) = server_base_url.as_deref() {
                Url::parse(url).map_err(|err| ConfigError::InvalidField {
                    field: "settings.server_base_url",
                    message: err.to_string(),
                })?;
            }
            SettingsConfig::Static { server_base_url }
        };

        for (field, value) in [
            ("http.timeout", self.http.timeout),
            ("http.connect_timeout", self.http.connect_timeout),
        ] {
            if value.is_some_and(|d| d.is_zero()) {
                return Err(ConfigError::InvalidField {
                    field,
                    message: "duration must be greater than zero".to_string(),
                }
                .into());
            }
        }

        Ok(Config {
            listen,
            plugin_id,
            ci_url,
            settings,
            http: HttpSettings {
                timeout: self.http.timeout,
                connect_timeout: self.http.connect_timeout,
            },
        })
    }
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for RawPlugin {
    fn default() -> Self {
        Self {
            id: default_plugin_id(),
            ci_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RawConfig, load};
    use crate::config::SettingsConfig;
    use crate::error::{ConfigError, Error};

    fn build(raw: RawConfig) -> crate::config::Config {
        match raw.validate_and_build() {
            Ok(config) => config,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn defaults_build_a_static_unconfigured_relay() {
        let config = build(RawConfig::default());
        assert_eq!(config.listen.to_string(), "127.0.0.1:8153");
        assert_eq!(config.plugin_id, "build.badge");
        assert_eq!(
            config.settings,
            SettingsConfig::Static {
                server_base_url: None
            }
        );
        assert!(config.http.timeout.is_none());
    }

    #[test]
    fn host_url_takes_precedence() {
        let mut raw = RawConfig::default();
        raw.settings.server_base_url = Some("http://badge.example".to_string());
        raw.settings.host_url = Some("http://ci.example/plugin-settings".to_string());
        let config = build(raw);
        assert!(matches!(config.settings, SettingsConfig::Host { .. }));
    }

    #[test]
    fn blank_base_url_is_left_unset() {
        let mut raw = RawConfig::default();
        raw.settings.server_base_url = Some("  ".to_string());
        let config = build(raw);
        assert_eq!(
            config.settings,
            SettingsConfig::Static {
                server_base_url: None
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let mut raw = RawConfig::default();
        raw.server.listen = "nowhere".to_string();
        assert!(matches!(
            raw.validate_and_build(),
            Err(Error::Config(ConfigError::InvalidField {
                field: "server.listen",
                ..
            }))
        ));

        let mut raw = RawConfig::default();
        raw.settings.server_base_url = Some("badge.example".to_string());
        assert!(raw.validate_and_build().is_err());

        let mut raw = RawConfig::default();
        raw.http.timeout = Some(Duration::ZERO);
        assert!(matches!(
            raw.validate_and_build(),
            Err(Error::Config(ConfigError::InvalidField {
                field: "http.timeout",
                ..
            }))
        ));
    }

    #[test]
    fn ci_url_is_optional_but_must_parse() {
        let mut raw = RawConfig::default();
        raw.plugin.ci_url = Some(" http://ci.example:8153 ".to_string());
        let config = build(raw);
        assert_eq!(
            config.ci_url.as_ref().map(url::Url::as_str),
            Some("http://ci.example:8153/")
        );

        let mut raw = RawConfig::default();
        raw.plugin.ci_url = Some(String::new());
        assert!(build(raw).ci_url.is_none());

        let mut raw = RawConfig::default();
        raw.plugin.ci_url = Some("ci.example".to_string());
        assert!(matches!(
            raw.validate_and_build(),
            Err(Error::Config(ConfigError::InvalidField {
                field: "plugin.ci_url",
                ..
            }))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let raw = match load("does-not-exist.toml") {
            Ok(raw) => raw,
            Err(err) => panic!("unexpected error: {err}"),
        };
        assert_eq!(raw.plugin.id, "build.badge");
    }
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::SettingsError;

/// Settings key holding the badge server base URL.
pub const SERVER_BASE_URL_KEY: &str = "server_base_url";
/// Host API consulted for this plugin's settings.
pub const GET_PLUGIN_SETTINGS_API: &str = "go.processor.plugin-settings.get";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    pub server_base_url: String,
}

/// Where the relay looks up its plugin settings. Queried once per event.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Look up a single settings value; `None` when the host has nothing
    /// stored under `key`.
    async fn lookup(&self, key: &str) -> Result<Option<String>, SettingsError>;
}

/// Resolve the badge server base URL.
///
/// # Errors
///
/// Returns [`SettingsError::NotConfigured`] when the value is missing or
/// blank, or the source's own error when the lookup fails.
pub async fn fetch(source: &dyn SettingsSource) -> Result<PluginSettings, SettingsError> {
    let value = source
        .lookup(SERVER_BASE_URL_KEY)
        .await?
        .filter(|value| !value.trim().is_empty())
        .ok_or(SettingsError::NotConfigured)?;
    Ok(PluginSettings {
        server_base_url: value.trim().to_string(),
    })
}

/// Settings held by the relay's own configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    #[must_use]
    pub fn new(server_base_url: Option<String>) -> Self {
        let mut values = HashMap::new();
        if let Some(url) = server_base_url {
            values.insert(SERVER_BASE_URL_KEY.to_string(), url);
        }
        Self { values }
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn lookup(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.values.get(key).cloned())
    }
}

/// Settings stored by the CI host, fetched over HTTP on every lookup.
#[derive(Clone)]
pub struct HostSettings {
    http: reqwest::Client,
    endpoint: Url,
    plugin_id: String,
}

impl HostSettings {
    /// # Errors
    ///
    /// Returns [`SettingsError::Host`] if the HTTP client fails to build.
    pub fn new(
        endpoint: Url,
        plugin_id: impl Into<String>,
        timeout: Option<Duration>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, SettingsError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("badge-relay/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let http = builder
            .build()
            .map_err(|source| SettingsError::Host { source })?;
        Ok(Self {
            http,
            endpoint,
            plugin_id: plugin_id.into(),
        })
    }
}

#[async_trait]
impl SettingsSource for HostSettings {
    async fn lookup(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let body = self
            .http
            .post(self.endpoint.clone())
            .header("x-plugin-api", GET_PLUGIN_SETTINGS_API)
            .json(&json!({ "plugin-id": self.plugin_id }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| SettingsError::Host { source })?
            .text()
            .await
            .map_err(|source| SettingsError::Host { source })?;
        debug!(plugin_id = %self.plugin_id, bytes = body.len(), "plugin settings fetched");

        let settings = parse_settings_body(&body)?;
        Ok(settings.get(key).cloned())
    }
}

/// Decode the host's settings response body into key/value pairs.
///
/// Non-string values are skipped, so a `null` entry reads as absent.
///
/// # Errors
///
/// An empty body means the plugin was never configured and yields
/// [`SettingsError::NotConfigured`]; anything other than a JSON object is
/// [`SettingsError::InvalidBody`].
pub fn parse_settings_body(body: &str) -> Result<HashMap<String, String>, SettingsError> {
    if body.trim().is_empty() {
        return Err(SettingsError::NotConfigured);
    }
    let value: Value = serde_json::from_str(body).map_err(|err| SettingsError::InvalidBody {
        message: err.to_string(),
    })?;
    let Value::Object(map) = value else {
        return Err(SettingsError::InvalidBody {
            message: "expected a JSON object".to_string(),
        });
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect())
}

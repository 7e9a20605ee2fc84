use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid configuration for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("configuration error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed stage status event: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("plugin is not configured. please provide plugin settings.")]
    NotConfigured,
    #[error("settings lookup failed: {source}")]
    Host {
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid plugin settings payload: {message}")]
    InvalidBody { message: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid badge server url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("{source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid response from badge server: {message}")]
    InvalidResponse { message: String },
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unsupported plugin request: {0}")]
    UnsupportedRequest(String),
    #[error("malformed {request} request body: {message}")]
    InvalidRequest {
        request: &'static str,
        message: String,
    },
}

impl From<reqwest::Error> for NotifyError {
    fn from(source: reqwest::Error) -> Self {
        Self::Transport { source }
    }
}

impl Error {
    /// Errors that abort the host request instead of being folded into a
    /// failure report.
    #[must_use]
    pub const fn is_request_fatal(&self) -> bool {
        matches!(self, Self::Event(_) | Self::Plugin(_))
    }
}

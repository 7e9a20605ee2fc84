//! Host-facing request dispatcher.
//!
//! The CI host talks to the relay through named requests carrying a JSON
//! body. Only `stage-status` does real work; the remaining requests describe
//! the plugin's single settings field to the host.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::field::Empty;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use crate::Result;
use crate::badge::{BadgeClient, NotifyOutcome};
use crate::error::{Error, PluginError};
use crate::event::StageStatusEvent;
use crate::settings::{self, SERVER_BASE_URL_KEY, SettingsSource};

pub const EXTENSION_TYPE: &str = "notification";
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

pub const REQUEST_NOTIFICATIONS_INTERESTED_IN: &str = "notifications-interested-in";
pub const REQUEST_STAGE_STATUS: &str = "stage-status";
pub const PLUGIN_SETTINGS_GET_CONFIGURATION: &str = "go.plugin-settings.get-configuration";
pub const PLUGIN_SETTINGS_VALIDATE_CONFIGURATION: &str =
    "go.plugin-settings.validate-configuration";

pub const LABEL_SERVER_BASE_URL: &str = "Build Badge Server URL";

pub const SUCCESS_RESPONSE_CODE: u16 = 200;
pub const INTERNAL_ERROR_RESPONSE_CODE: u16 = 500;

/// Identifies the plugin to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginIdentifier {
    pub extension: &'static str,
    pub versions: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginResponse {
    pub code: u16,
    pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

/// Reply to a `stage-status` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl StatusReport {
    #[must_use]
    pub const fn success() -> Self {
        Self {
            status: Status::Success,
            messages: Vec::new(),
        }
    }

    /// A failure report; blank messages are dropped.
    #[must_use]
    pub fn failure(message: &str) -> Self {
        let messages = if message.trim().is_empty() {
            Vec::new()
        } else {
            vec![message.to_string()]
        };
        Self {
            status: Status::Failure,
            messages,
        }
    }

    #[must_use]
    pub const fn code(&self) -> u16 {
        match self.status {
            Status::Success => SUCCESS_RESPONSE_CODE,
            Status::Failure => INTERNAL_ERROR_RESPONSE_CODE,
        }
    }

    #[must_use]
    pub fn into_response(self) -> PluginResponse {
        let code = self.code();
        PluginResponse {
            code,
            body: json!(self),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    #[serde(rename = "plugin-settings", default)]
    plugin_settings: HashMap<String, SettingsField>,
}

#[derive(Debug, Deserialize)]
struct SettingsField {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub key: &'static str,
    pub message: String,
}

/// Where a stage run can be inspected on the CI host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLinks {
    pub run: Url,
    pub history: Url,
}

#[derive(Clone)]
pub struct Plugin {
    settings: Arc<dyn SettingsSource>,
    badge: BadgeClient,
    ci_host: Option<String>,
}

impl Plugin {
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsSource>, badge: BadgeClient) -> Self {
        Self {
            settings,
            badge,
            ci_host: None,
        }
    }

    /// Attach stage links on `host` to the logs of every stage event.
    #[must_use]
    pub fn with_ci_host(mut self, host: impl Into<String>) -> Self {
        self.ci_host = Some(host.into());
        self
    }

    /// Links for `event`, when a CI host is known and the links parse.
    #[must_use]
    pub fn stage_links(&self, event: &StageStatusEvent) -> Option<StageLinks> {
        let host = self.ci_host.as_deref()?.trim_end_matches('/');
        match (event.go_server_url(host), event.go_history_url(host)) {
            (Ok(run), Ok(history)) => Some(StageLinks { run, history }),
            (Err(err), _) | (_, Err(err)) => {
                warn!(%host, error = %err, "cannot build CI links");
                None
            }
        }
    }

    #[must_use]
    pub const fn identifier() -> PluginIdentifier {
        PluginIdentifier {
            extension: EXTENSION_TYPE,
            versions: SUPPORTED_VERSIONS,
        }
    }

    /// Dispatch one host request.
    ///
    /// # Errors
    ///
    /// Unknown request names, malformed request bodies and unparseable stage
    /// events abort the request. Failures after parsing are reported inside
    /// the returned [`PluginResponse`] instead.
    pub async fn handle(&self, request_name: &str, body: &[u8]) -> Result<PluginResponse> {
        info!(request = request_name, "handling request");
        match request_name {
            REQUEST_STAGE_STATUS => self.handle_stage_status(body).await,
            REQUEST_NOTIFICATIONS_INTERESTED_IN => Ok(PluginResponse {
                code: SUCCESS_RESPONSE_CODE,
                body: json!({ "notifications": [REQUEST_STAGE_STATUS] }),
            }),
            PLUGIN_SETTINGS_GET_CONFIGURATION => Ok(settings_configuration()),
            PLUGIN_SETTINGS_VALIDATE_CONFIGURATION => validate_configuration(body),
            other => Err(PluginError::UnsupportedRequest(other.to_string()).into()),
        }
    }

    async fn handle_stage_status(&self, body: &[u8]) -> Result<PluginResponse> {
        let event = StageStatusEvent::from_json(body)?;
        let job = event.fully_qualified_job_name();
        let span = info_span!(
            "stage_status",
            pipeline = event.pipeline_name(),
            %job,
            link = Empty,
            history = Empty
        );
        if let Some(links) = self.stage_links(&event) {
            span.record("link", links.run.as_str());
            span.record("history", links.history.as_str());
        }

        let report = async {
            info!(
                created = event.create_time(),
                transitioned = event.last_transition_time(),
                "{job} has {}/{}",
                event.stage_state(),
                event.stage_result()
            );
            self.forward(&event).await
        }
        .instrument(span)
        .await;
        Ok(report.into_response())
    }

    async fn forward(&self, event: &StageStatusEvent) -> StatusReport {
        let settings = match settings::fetch(self.settings.as_ref()).await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "cannot resolve badge server url");
                return StatusReport::failure(&error_chain(&err));
            }
        };

        match self
            .badge
            .notify(
                event.pipeline_name(),
                event.stage_result(),
                &settings.server_base_url,
            )
            .await
        {
            Ok(NotifyOutcome::Skipped) => StatusReport::success(),
            Ok(NotifyOutcome::Delivered { status }) => {
                info!(status, "badge server accepted update");
                StatusReport::success()
            }
            Err(err) => {
                error!(error = %err, "error handling status message");
                StatusReport::failure(&error_chain(&err))
            }
        }
    }
}

fn settings_configuration() -> PluginResponse {
    PluginResponse {
        code: SUCCESS_RESPONSE_CODE,
        body: json!({
            SERVER_BASE_URL_KEY: {
                "display-name": LABEL_SERVER_BASE_URL,
                "default-value": null,
                "required": true,
                "secure": false,
                "display-order": "0",
            }
        }),
    }
}

fn validate_configuration(body: &[u8]) -> Result<PluginResponse> {
    let request: ValidateRequest = serde_json::from_slice(body).map_err(|err| {
        Error::from(PluginError::InvalidRequest {
            request: PLUGIN_SETTINGS_VALIDATE_CONFIGURATION,
            message: err.to_string(),
        })
    })?;

    let errors = required_field_errors(&request.plugin_settings);
    Ok(PluginResponse {
        code: SUCCESS_RESPONSE_CODE,
        body: json!(errors),
    })
}

fn required_field_errors(fields: &HashMap<String, SettingsField>) -> Vec<FieldError> {
    let configured = fields
        .get(SERVER_BASE_URL_KEY)
        .and_then(|field| field.value.as_deref())
        .is_some_and(|value| !value.is_empty());
    if configured {
        return Vec::new();
    }
    vec![FieldError {
        key: SERVER_BASE_URL_KEY,
        message: format!("'{LABEL_SERVER_BASE_URL}' is a required field"),
    }]
}

/// The error's message followed by each distinct underlying cause.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !text.is_empty() && !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

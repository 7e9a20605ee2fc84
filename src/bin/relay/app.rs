use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use badge_relay::Result;
use badge_relay::badge::BadgeClient;
use badge_relay::config::{Config, SettingsConfig};
use badge_relay::plugin::{Plugin, PluginResponse, REQUEST_STAGE_STATUS, SUCCESS_RESPONSE_CODE};
use badge_relay::server::{self, AppState};
use badge_relay::settings::{HostSettings, SettingsSource, StaticSettings};
use badge_relay::telemetry::init_tracing;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::signal;
use tracing::{info, warn};

use super::cli::{Cli, Command};

const DEFAULT_CONFIG: &str = "badge-relay.toml";

pub async fn run(cli: Cli) -> Result<ExitCode> {
    init_tracing(cli.log_filter.as_deref(), cli.json_logs)?;

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = Config::from_env_and_file(&config_path)?;

    match cli.command {
        Command::Serve { listen } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            let plugin = build_plugin(&config)?;
            server::serve(config.listen, AppState::new(plugin), shutdown_signal()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Notify { event, base_url } => {
            if let Some(url) = base_url {
                config.settings = SettingsConfig::Static {
                    server_base_url: Some(url),
                };
            }
            let plugin = build_plugin(&config)?;
            let response = notify_event(&plugin, event.as_deref()).await?;
            println!("{}", response.body);
            Ok(ExitCode::from(exit_status(&response)))
        }
    }
}

fn build_plugin(config: &Config) -> Result<Plugin> {
    let badge = BadgeClient::new(config.http.timeout, config.http.connect_timeout)?;
    let plugin = Plugin::new(settings_source(config)?, badge);
    Ok(match &config.ci_url {
        Some(url) => plugin.with_ci_host(url.as_str()),
        None => plugin,
    })
}

fn settings_source(config: &Config) -> Result<Arc<dyn SettingsSource>> {
    match &config.settings {
        SettingsConfig::Static { server_base_url } => {
            if server_base_url.is_none() {
                warn!("no badge server url configured; stage events will be reported as failures");
            }
            Ok(Arc::new(StaticSettings::new(server_base_url.clone())))
        }
        SettingsConfig::Host { endpoint } => {
            info!(%endpoint, plugin_id = %config.plugin_id, "plugin settings served by host");
            Ok(Arc::new(HostSettings::new(
                endpoint.clone(),
                config.plugin_id.clone(),
                config.http.timeout,
                config.http.connect_timeout,
            )?))
        }
    }
}

/// Relaie un événement lu depuis `path`, ou depuis stdin si absent.
async fn notify_event(plugin: &Plugin, path: Option<&Path>) -> Result<PluginResponse> {
    let body = match path {
        Some(path) => tokio::fs::read(path).await?,
        None => read_all(tokio::io::stdin()).await?,
    };
    plugin.handle(REQUEST_STAGE_STATUS, &body).await
}

/// 0 si l'hôte aurait reçu un succès, 2 sinon.
const fn exit_status(response: &PluginResponse) -> u8 {
    if response.code == SUCCESS_RESPONSE_CODE {
        0
    } else {
        2
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    Ok(body)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, stopping server");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::io::Write;

    use badge_relay::config::{Config, SettingsConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{build_plugin, exit_status, notify_event, read_all, settings_source};

    const EVENT: &str = r#"{"pipeline":{"name":"demo","counter":"3","stage":{"name":"build","counter":"1","state":"Passed","result":"Passed"}}}"#;

    fn config_for(server_base_url: Option<String>) -> Config {
        Config {
            settings: SettingsConfig::Static { server_base_url },
            ..Config::default()
        }
    }

    fn event_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(EVENT.as_bytes()).expect("write event");
        file
    }

    #[tokio::test]
    async fn static_settings_are_served_from_config() {
        let config = config_for(Some("http://badge.example".to_string()));
        let source = settings_source(&config).expect("settings source");
        let settings = badge_relay::settings::fetch(source.as_ref()).await;
        assert_eq!(
            settings.map(|s| s.server_base_url).ok().as_deref(),
            Some("http://badge.example")
        );
    }

    #[tokio::test]
    async fn event_file_is_relayed_and_exits_zero() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = build_plugin(&config_for(Some(server.uri()))).expect("plugin");
        let file = event_file();
        let response = notify_event(&plugin, Some(file.path()))
            .await
            .expect("response");

        assert_eq!(response.body, json!({"status": "success"}));
        assert_eq!(exit_status(&response), 0);
    }

    #[tokio::test]
    async fn unconfigured_relay_exits_two() {
        let plugin = build_plugin(&config_for(None)).expect("plugin");
        let file = event_file();
        let response = notify_event(&plugin, Some(file.path()))
            .await
            .expect("response");

        assert_eq!(response.code, 500);
        assert_eq!(response.body["status"], "failure");
        assert_eq!(exit_status(&response), 2);
    }

    #[tokio::test]
    async fn missing_event_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let plugin = build_plugin(&config_for(None)).expect("plugin");
        let result = notify_event(&plugin, Some(&dir.path().join("absent.json"))).await;
        assert!(matches!(result, Err(badge_relay::error::Error::Io(_))));
    }

    #[tokio::test]
    async fn reader_is_drained_to_the_end() {
        let body = read_all(EVENT.as_bytes()).await.expect("read");
        assert_eq!(body, EVENT.as_bytes());
    }
}

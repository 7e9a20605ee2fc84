//! HTTP surface through which a CI host delivers plugin requests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::Result;
use crate::plugin::{Plugin, StatusReport};

#[derive(Clone)]
pub struct AppState {
    plugin: Arc<Plugin>,
}

impl AppState {
    #[must_use]
    pub fn new(plugin: Plugin) -> Self {
        Self {
            plugin: Arc::new(plugin),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/plugin", get(identifier))
        .route("/plugin/{request_name}", post(plugin_request))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening for plugin requests");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn identifier() -> impl IntoResponse {
    Json(Plugin::identifier())
}

async fn plugin_request(
    Path(request_name): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    match state.plugin.handle(&request_name, &body).await {
        Ok(response) => {
            let code = StatusCode::from_u16(response.code).unwrap_or(StatusCode::OK);
            (code, Json(response.body)).into_response()
        }
        Err(err) => {
            warn!(request = %request_name, error = %err, "rejected plugin request");
            let code = if err.is_request_fatal() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (code, Json(StatusReport::failure(&err.to_string()))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{AppState, router};
    use crate::badge::BadgeClient;
    use crate::plugin::Plugin;
    use crate::settings::StaticSettings;

    const PASSED: &str = r#"{"pipeline":{"name":"demo","counter":"3","stage":{"name":"build","counter":"1","state":"Passed","result":"Passed"}}}"#;

    fn app(server_base_url: Option<String>) -> axum::Router {
        let badge = match BadgeClient::new(None, None) {
            Ok(client) => client,
            Err(err) => panic!("client: {err}"),
        };
        let plugin = Plugin::new(Arc::new(StaticSettings::new(server_base_url)), badge);
        router(AppState::new(plugin))
    }

    async fn call(uri: &str, method: &str, body: &'static str) -> (StatusCode, Value) {
        call_app(app(None), uri, method, body).await
    }

    async fn call_app(
        app: axum::Router,
        uri: &str,
        method: &str,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let request = match Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
        {
            Ok(request) => request,
            Err(err) => panic!("request: {err}"),
        };
        let response = match app.oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router: {err}"),
        };
        let status = response.status();
        let bytes = match to_bytes(response.into_body(), usize::MAX).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("body: {err}"),
        };
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn unknown_result_still_requires_settings() {
        let body = r#"{"pipeline":{"name":"demo","counter":"3","stage":{"name":"build","counter":"1","state":"Building","result":"Unknown"}}}"#;
        let (status, value) = call("/plugin/stage-status", "POST", body).await;
        // Settings are resolved before filtering, so an unconfigured relay
        // still reports the missing base URL.
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(value["status"], "failure");
    }

    #[tokio::test]
    async fn stage_status_is_relayed_to_the_badge_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/status"))
            .and(body_json(json!({"pipeline": "demo", "status": "Passed"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let app = app(Some(server.uri()));
        let (status, value) = call_app(app, "/plugin/stage-status", "POST", PASSED).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({"status": "success"}));
    }

    #[tokio::test]
    async fn malformed_event_is_a_bad_request() {
        let (status, value) = call("/plugin/stage-status", "POST", "{").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["status"], "failure");
    }

    #[tokio::test]
    async fn unsupported_request_is_a_bad_request() {
        let (status, _) = call("/plugin/go.plugin-settings.get-view", "POST", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn exposes_identifier() {
        let (status, value) = call("/plugin", "GET", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({"extension": "notification", "versions": ["1.0"]}));
    }
}

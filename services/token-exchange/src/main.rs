//! Threads OAuth token exchange function
//!
//! Single-binary Rust service that:
//! 1. Receives the Threads OAuth callback (`GET /?code=...`)
//! 2. Exchanges the code at graph.threads.net for an access token
//! 3. Redirects to `thuft://callback` with the token or an error message

mod config;
mod exchange;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use common::EnvCredentials;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::exchange::{CallbackQuery, ExchangeState};
use crate::metrics::ExchangeCounters;

/// How long in-flight exchanges may run after SIGTERM before we exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    exchange: ExchangeState,
    counters: ExchangeCounters,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(exchange_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting threads-token-exchange");

    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no config file, using defaults"),
    }

    let config = Config::load(config_path.as_deref()).context("failed to load config")?;

    info!(
        listen_addr = %config.server.listen_addr,
        token_endpoint = %config.exchange.token_endpoint,
        redirect_uri = %config.exchange.redirect_uri,
        callback_uri = %config.exchange.callback_uri,
        "configuration loaded"
    );

    let client = threads_auth::http_client().context("failed to build HTTP client")?;
    let counters = ExchangeCounters::new();

    let app_state = AppState {
        exchange: ExchangeState {
            client,
            endpoint: config.exchange.endpoint(),
            callback_uri: config.exchange.callback_uri.clone(),
            credentials: Arc::new(EnvCredentials),
            counters: counters.clone(),
        },
        counters,
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the timer.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// OAuth callback: exchange the code and redirect to the app.
///
/// An undecodable query string is treated like a missing code so the
/// caller still gets a redirect instead of axum's 400.
async fn exchange_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<CallbackQuery>, QueryRejection>,
) -> Response {
    let code = match query {
        Ok(Query(query)) => query.code,
        Err(rejection) => {
            warn!(error = %rejection, "could not decode query string");
            None
        }
    };
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    exchange::exchange_and_redirect(&state.exchange, code, request_id).await
}

/// Health endpoint: uptime and exchange counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.counters.started_at.elapsed().as_secs(),
        "exchanges_total": state.counters.exchanges_total.load(Ordering::Relaxed),
        "failures_total": state.counters.failures_total.load(Ordering::Relaxed),
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::{ClientCredentials, CredentialSource};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use threads_auth::TokenEndpoint;
    use tower::ServiceExt;

    /// PrometheusHandle without installing the global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    /// Forms received by the mock token endpoint.
    type FormLog = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Mock Threads token endpoint.
    ///
    /// `good-*` codes succeed once and are rejected like Threads does on reuse.
    async fn start_token_endpoint() -> (String, FormLog) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let forms: FormLog = Arc::default();
        let used: Arc<Mutex<HashSet<String>>> = Arc::default();

        let log = forms.clone();
        let app = Router::new().route(
            "/oauth/access_token",
            axum::routing::post(
                move |axum::Form(form): axum::Form<HashMap<String, String>>| {
                    let log = log.clone();
                    let used = used.clone();
                    async move {
                        let code = form.get("code").cloned().unwrap_or_default();
                        log.lock().unwrap().push(form);

                        if code.starts_with("good") {
                            if !used.lock().unwrap().insert(code) {
                                return (
                                    StatusCode::BAD_REQUEST,
                                    r#"{"error":{"message":"This authorization code has been used","type":"OAuthException","code":100}}"#,
                                )
                                    .into_response();
                            }
                            return (
                                StatusCode::OK,
                                r#"{"access_token":"THQVJtoken123","user_id":1789}"#,
                            )
                                .into_response();
                        }

                        match code.as_str() {
                            "empty" => (StatusCode::OK, "{}").into_response(),
                            "control-char" => (
                                StatusCode::OK,
                                r#"{"access_token":"bad\u0001token","user_id":1}"#,
                            )
                                .into_response(),
                            "string-error" => (
                                StatusCode::BAD_REQUEST,
                                r#"{"error":"bad_request"}"#,
                            )
                                .into_response(),
                            _ => (
                                StatusCode::BAD_REQUEST,
                                r#"{"error":{"message":"Invalid code","type":"OAuthException"}}"#,
                            )
                                .into_response(),
                        }
                    }
                },
            ),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/oauth/access_token"), forms)
    }

    /// Credential source that always fails, like a missing secret binding.
    struct MissingSecrets;

    impl CredentialSource for MissingSecrets {
        fn resolve(&self) -> common::Result<ClientCredentials> {
            Err(common::Error::Config("THREADS_APP_ID is not set".into()))
        }
    }

    fn test_app_state(token_url: &str, credentials: Arc<dyn CredentialSource>) -> AppState {
        let counters = ExchangeCounters::new();
        AppState {
            exchange: ExchangeState {
                client: threads_auth::http_client().unwrap(),
                endpoint: TokenEndpoint {
                    url: token_url.to_string(),
                    redirect_uri: "https://fn.example.test".into(),
                },
                callback_uri: threads_auth::CALLBACK_URI.to_string(),
                credentials,
                counters: counters.clone(),
            },
            counters,
            prometheus: test_prometheus_handle(),
        }
    }

    fn fixed_credentials() -> Arc<dyn CredentialSource> {
        Arc::new(ClientCredentials::new(" 1234567890\n", "  app-secret "))
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &axum::response::Response) -> &str {
        response
            .headers()
            .get(axum::http::header::LOCATION)
            .expect("redirect must carry a Location header")
            .to_str()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_exchange_redirects_with_token() {
        let (token_url, _forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/?code=good-1").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "thuft://callback?access_token=THQVJtoken123&user_id=1789"
        );
    }

    #[tokio::test]
    async fn outbound_form_has_all_fields_trimmed() {
        let (token_url, forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        get(app, "/?code=good-2&state=ignored").await;

        let forms = forms.lock().unwrap();
        assert_eq!(forms.len(), 1, "exactly one outbound call per request");
        let form = &forms[0];
        assert_eq!(form["client_id"], "1234567890");
        assert_eq!(form["client_secret"], "app-secret");
        assert_eq!(form["code"], "good-2");
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["redirect_uri"], "https://fn.example.test");
    }

    #[tokio::test]
    async fn missing_token_redirects_with_error() {
        let (token_url, _forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/?code=empty").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "thuft://callback?error=Access%20token%20not%20found%20in%20response"
        );
    }

    #[tokio::test]
    async fn provider_error_object_message_is_encoded() {
        let (token_url, _forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/?code=expired").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "thuft://callback?error=Invalid%20code");
    }

    #[tokio::test]
    async fn provider_error_string_is_used_directly() {
        let (token_url, _forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/?code=string-error").await;

        assert_eq!(location(&response), "thuft://callback?error=bad_request");
    }

    #[tokio::test]
    async fn unreachable_provider_still_redirects() {
        let app = build_router(
            test_app_state("http://127.0.0.1:1/oauth/access_token", fixed_credentials()),
            1000,
        );

        let response = get(app, "/?code=good-3").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = location(&response);
        assert!(
            location.starts_with("thuft://callback?error=") && location.len() > 23,
            "transport failure must become an error redirect, got: {location}"
        );
    }

    #[tokio::test]
    async fn reused_code_resolves_to_error_redirect() {
        let (token_url, forms) = start_token_endpoint().await;
        let state = test_app_state(&token_url, fixed_credentials());

        let first = get(build_router(state.clone(), 1000), "/?code=good-reused").await;
        assert!(location(&first).contains("access_token="));

        let second = get(build_router(state, 1000), "/?code=good-reused").await;
        assert_eq!(second.status(), StatusCode::FOUND);
        assert_eq!(
            location(&second),
            "thuft://callback?error=This%20authorization%20code%20has%20been%20used"
        );
        assert_eq!(forms.lock().unwrap().len(), 2, "no retries");
    }

    #[tokio::test]
    async fn missing_code_is_forwarded_empty() {
        let (token_url, forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "thuft://callback?error=Invalid%20code");
        assert_eq!(forms.lock().unwrap()[0]["code"], "");
    }

    #[tokio::test]
    async fn undecodable_query_is_treated_as_missing_code() {
        let (token_url, forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/?code=a&code=b").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).starts_with("thuft://callback?error="));
        assert_eq!(forms.lock().unwrap()[0]["code"], "");
    }

    #[tokio::test]
    async fn unresolvable_credentials_redirect_with_config_error() {
        let (token_url, forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, Arc::new(MissingSecrets)), 1000);

        let response = get(app, "/?code=good-4").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "thuft://callback?error=Configuration%20error%3A%20THREADS_APP_ID%20is%20not%20set"
        );
        assert!(
            forms.lock().unwrap().is_empty(),
            "no outbound call without credentials"
        );
    }

    #[tokio::test]
    async fn token_unusable_in_header_falls_back_to_error() {
        let (token_url, _forms) = start_token_endpoint().await;
        let app = build_router(test_app_state(&token_url, fixed_credentials()), 1000);

        let response = get(app, "/?code=control-char").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            location(&response),
            "thuft://callback?error=Invalid%20redirect%20target"
        );
    }

    #[tokio::test]
    async fn health_endpoint_reports_counters() {
        let (token_url, _forms) = start_token_endpoint().await;
        let state = test_app_state(&token_url, fixed_credentials());

        get(build_router(state.clone(), 1000), "/?code=good-5").await;
        get(build_router(state.clone(), 1000), "/?code=empty").await;

        let response = get(build_router(state, 1000), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["exchanges_total"], 2);
        assert_eq!(json["failures_total"], 1);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let app = build_router(
            test_app_state("http://unused", fixed_credentials()),
            1000,
        );
        let response = get(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn post_is_not_an_exchange() {
        let app = build_router(
            test_app_state("http://unused", fixed_credentials()),
            1000,
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/?code=good-6")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

//! Authorization code callback handling
//!
//! Turns `GET /?code=...` into one token exchange and a `302` to the app's
//! custom-scheme callback. Every failure, including unresolvable
//! credentials, ends in the error redirect; this handler never answers with
//! a 4xx/5xx.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use common::CredentialSource;
use serde::Deserialize;
use threads_auth::TokenEndpoint;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::{self, ExchangeCounters};

/// Message used when a success URI cannot be carried in a Location header
const INVALID_TARGET: &str = "Invalid redirect target";

/// Shared state for the exchange handler
#[derive(Clone)]
pub struct ExchangeState {
    /// Built by `threads_auth::http_client()` so redirects are not followed
    pub client: reqwest::Client,
    pub endpoint: TokenEndpoint,
    pub callback_uri: String,
    pub credentials: Arc<dyn CredentialSource>,
    pub counters: ExchangeCounters,
}

/// Query parameters of the OAuth callback. Anything besides `code` is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
}

/// Exchange `code` and redirect to the app with the token or an error.
#[instrument(skip_all, fields(request_id = %request_id))]
pub async fn exchange_and_redirect(
    state: &ExchangeState,
    code: Option<String>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    state.counters.exchanges_total.fetch_add(1, Ordering::Relaxed);

    info!(
        code = code.as_deref().unwrap_or_default(),
        code_present = code.is_some(),
        "received authorization code"
    );
    let code = code.unwrap_or_default();

    let outcome = match state.credentials.resolve() {
        Ok(credentials) => {
            info!(
                client_id = credentials.client_id(),
                client_id_len = credentials.client_id().len(),
                "using client id"
            );
            threads_auth::exchange_code(&state.client, &state.endpoint, &credentials, &code).await
        }
        Err(e) => Err(e.into()),
    };

    let label = match &outcome {
        Ok(_) => "success",
        Err(e) => {
            state.counters.failures_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_failure(e.kind());
            error!(kind = e.kind(), error = %e, "token exchange failed");
            "failure"
        }
    };
    metrics::record_exchange(label, started.elapsed().as_secs_f64());

    let location = threads_auth::callback_uri(&state.callback_uri, &outcome);
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            if outcome.is_ok() {
                debug!(location = %location, "redirecting to app");
            } else {
                info!(location = %location, "redirecting to app with error");
            }
            found(value)
        }
        Err(e) => {
            warn!(error = %e, "callback URI is not a valid header value");
            let fallback = threads_auth::error_uri(&state.callback_uri, INVALID_TARGET);
            // Percent-encoding leaves only header-safe ASCII; the base is checked at config load
            found(
                HeaderValue::from_str(&fallback)
                    .unwrap_or_else(|_| HeaderValue::from_static(threads_auth::CALLBACK_URI)),
            )
        }
    }
}

fn found(location: HeaderValue) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

//! OAuth authorization code exchange
//!
//! One POST to the Threads token endpoint per call. The response is decoded
//! leniently: the endpoint answers with either a token grant or an `error`
//! field that is sometimes a plain string and sometimes an object carrying
//! `message`/`type`. Redirects from the endpoint are never followed; the
//! client from [`http_client`] hands them back as ordinary responses.

use std::fmt;

use common::ClientCredentials;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{GRANT_TYPE, REDIRECT_URI, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// Where to exchange codes and which redirect URI to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpoint {
    pub url: String,
    pub redirect_uri: String,
}

impl Default for TokenEndpoint {
    fn default() -> Self {
        Self {
            url: TOKEN_ENDPOINT.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
        }
    }
}

/// A successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Threads sends this as a JSON number; some responses use a string
    pub user_id: Option<UserId>,
}

/// Threads user id as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{n}"),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// The `error` field of a token endpoint response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum ProviderError {
    Message(String),
    Detailed(ProviderErrorObject),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ProviderErrorObject {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl ProviderError {
    /// Human-readable message, or None if the field carries nothing usable.
    fn message(self) -> Option<String> {
        match self {
            ProviderError::Message(s) if s.is_empty() => None,
            ProviderError::Message(s) => Some(s),
            ProviderError::Detailed(obj) => Some(
                obj.message
                    .filter(|m| !m.is_empty())
                    .or(obj.kind.filter(|t| !t.is_empty()))
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            ProviderError::Other(_) => Some("Unknown error".to_string()),
        }
    }
}

/// Token endpoint response body.
#[derive(Debug, Default, Deserialize)]
struct TokenEndpointBody {
    #[serde(default)]
    access_token: Option<serde_json::Value>,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ProviderError>,
}

impl TokenEndpointBody {
    /// Decode a raw body. Anything that is not a JSON object yields None.
    fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    fn into_grant(self) -> Option<TokenGrant> {
        let access_token = match self.access_token {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            _ => return None,
        };
        let user_id = self
            .user_id
            .and_then(|v| serde_json::from_value::<UserId>(v).ok());
        Some(TokenGrant {
            access_token,
            user_id,
        })
    }
}

/// Form body sent to the token endpoint, in the field order Threads documents.
#[derive(Serialize)]
struct ExchangeForm<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    grant_type: &'static str,
    redirect_uri: &'a str,
}

/// Build the HTTP client used for token exchange.
///
/// Redirects are disabled: a 3xx from the token endpoint is an answer to
/// inspect, not somewhere to send the client secret.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Exchange an authorization code for an access token.
///
/// Sends exactly one request. `code` is forwarded as-is, empty included;
/// the provider rejects what it does not accept.
pub async fn exchange_code(
    client: &reqwest::Client,
    endpoint: &TokenEndpoint,
    credentials: &ClientCredentials,
    code: &str,
) -> Result<TokenGrant> {
    let form = ExchangeForm {
        client_id: credentials.client_id(),
        client_secret: credentials.client_secret().expose(),
        code,
        grant_type: GRANT_TYPE,
        redirect_uri: &endpoint.redirect_uri,
    };

    info!(
        url = %endpoint.url,
        client_id = form.client_id,
        client_secret = %credentials.client_secret(),
        code = form.code,
        grant_type = form.grant_type,
        redirect_uri = form.redirect_uri,
        "sending token exchange request"
    );

    // `.form()` sets the urlencoded content type and an explicit Content-Length
    let response = client
        .post(&endpoint.url)
        .header(ACCEPT, "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            warn!(
                error = ?e,
                request.method = "POST",
                request.url = %endpoint.url,
                request.code = code,
                "token exchange request failed"
            );
            Error::Transport(e.to_string())
        })?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.map_err(|e| {
        warn!(status = status.as_u16(), error = ?e, "failed to read token endpoint response");
        Error::Transport(format!("failed to read token endpoint response: {e}"))
    })?;

    debug!(
        status = status.as_u16(),
        headers = ?headers,
        body = %body,
        "token endpoint responded"
    );

    let decoded = TokenEndpointBody::decode(&body);

    if !status.is_success() {
        let message = decoded
            .and_then(|b| b.error)
            .and_then(ProviderError::message)
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

        warn!(
            status = status.as_u16(),
            headers = ?headers,
            body = %body,
            request.method = "POST",
            request.url = %endpoint.url,
            request.client_id = form.client_id,
            request.code = code,
            request.redirect_uri = form.redirect_uri,
            error_message = %message,
            "token endpoint rejected exchange"
        );
        return Err(Error::ProviderRejection {
            status: status.as_u16(),
            message,
        });
    }

    match decoded.and_then(TokenEndpointBody::into_grant) {
        Some(grant) => {
            info!(
                status = status.as_u16(),
                user_id = %grant.user_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                "token exchange succeeded"
            );
            Ok(grant)
        }
        None => {
            warn!(
                status = status.as_u16(),
                headers = ?headers,
                body = %body,
                "token endpoint response has no access_token"
            );
            Err(Error::MissingToken)
        }
    }
}

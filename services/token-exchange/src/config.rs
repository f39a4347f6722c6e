//! Configuration types and loading
//!
//! Precedence: `--config` CLI arg > `CONFIG_PATH` env var > default file in
//! the working directory > built-in defaults. `PORT` (set by the serverless
//! platform) overrides the listen port. The Threads app id and secret are
//! never part of this file; they are read from the environment per request.

use axum::http::HeaderValue;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use threads_auth::TokenEndpoint;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "threads-token-exchange.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Token exchange targets
#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    /// Must match the redirect URI registered with the Threads app
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_callback_uri")]
    pub callback_uri: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            token_endpoint: default_token_endpoint(),
            redirect_uri: default_redirect_uri(),
            callback_uri: default_callback_uri(),
        }
    }
}

impl ExchangeConfig {
    pub fn endpoint(&self) -> TokenEndpoint {
        TokenEndpoint {
            url: self.token_endpoint.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_connections() -> usize {
    1000
}

fn default_token_endpoint() -> String {
    threads_auth::TOKEN_ENDPOINT.to_string()
}

fn default_redirect_uri() -> String {
    threads_auth::REDIRECT_URI.to_string()
}

fn default_callback_uri() -> String {
    threads_auth::CALLBACK_URI.to_string()
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay `PORT`.
    ///
    /// `None` means built-in defaults.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };

        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port.trim().parse().map_err(|e| {
                common::Error::Config(format!("PORT must be a port number, got {port:?}: {e}"))
            })?;
            config.server.listen_addr.set_port(port);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("token_endpoint", &self.exchange.token_endpoint),
            ("redirect_uri", &self.exchange.redirect_uri),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        let callback = &self.exchange.callback_uri;
        if !callback.contains("://") || HeaderValue::from_str(callback).is_err() {
            return Err(common::Error::Config(format!(
                "callback_uri must be an absolute URI usable as a Location header, got: {callback:?}"
            )));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the config file path from CLI arg, CONFIG_PATH, or the default file.
    ///
    /// Returns None when nothing was named and the default file does not exist.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }
}

//! Threads OAuth constants
//!
//! Fixed endpoints for the code exchange. `REDIRECT_URI` must match the
//! redirect URI registered with the Threads app and the URL this function is
//! deployed at; moving the deployment means updating both.

/// Token endpoint for authorization code exchange
pub const TOKEN_ENDPOINT: &str = "https://graph.threads.net/oauth/access_token";

/// Redirect URI sent with the exchange (this function's deployed URL)
pub const REDIRECT_URI: &str = "https://exchangecodefortokenv2-c6v7kntvaa-uc.a.run.app";

/// Custom-scheme URI the mobile app listens on
pub const CALLBACK_URI: &str = "thuft://callback";

/// OAuth grant type for code exchange
pub const GRANT_TYPE: &str = "authorization_code";

//! Error types for the token exchange

/// Ways a token exchange can fail.
///
/// `Display` is the message handed to the mobile app in `error=`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token endpoint answered with a non-2xx status
    #[error("{message}")]
    ProviderRejection { status: u16, message: String },

    /// 2xx response without a usable access token
    #[error("Access token not found in response")]
    MissingToken,

    /// The token endpoint could not be reached or its body could not be read
    #[error("{0}")]
    Transport(String),

    /// Client credentials could not be resolved
    #[error(transparent)]
    Config(#[from] common::Error),
}

impl Error {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ProviderRejection { .. } => "provider_rejection",
            Error::MissingToken => "missing_token",
            Error::Transport(_) => "transport",
            Error::Config(_) => "config",
        }
    }
}

/// Result alias for exchange operations.
pub type Result<T> = std::result::Result<T, Error>;

//! OAuth client credentials
//!
//! The app id and app secret are injected by the hosting platform's secret
//! manager as environment variables. They are resolved on every invocation
//! rather than cached at startup, so a rotated secret takes effect without a
//! redeploy. Handlers receive credentials through [`CredentialSource`] so
//! tests can supply fixed values.

use tracing::debug;

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Environment variable holding the Threads app id
pub const CLIENT_ID_VAR: &str = "THREADS_APP_ID";

/// Environment variable holding the Threads app secret
pub const CLIENT_SECRET_VAR: &str = "THREADS_APP_SECRET";

/// Client id and secret, both trimmed of surrounding whitespace.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: Secret<String>,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into().trim().to_owned(),
            client_secret: Secret::trimmed(client_secret.into()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &Secret<String> {
        &self.client_secret
    }
}

/// Resolves client credentials at call time.
pub trait CredentialSource: Send + Sync {
    fn resolve(&self) -> Result<ClientCredentials>;
}

/// Fixed credentials, mostly useful in tests.
impl CredentialSource for ClientCredentials {
    fn resolve(&self) -> Result<ClientCredentials> {
        Ok(self.clone())
    }
}

/// Reads `THREADS_APP_ID` / `THREADS_APP_SECRET` from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn resolve(&self) -> Result<ClientCredentials> {
        let client_id = read_var(CLIENT_ID_VAR)?;
        let client_secret = read_var(CLIENT_SECRET_VAR)?;

        let credentials = ClientCredentials::new(client_id.as_str(), client_secret);

        // Stray whitespace from secret managers is a common misconfiguration
        debug!(
            client_id = %credentials.client_id(),
            raw_len = client_id.len(),
            trimmed_len = credentials.client_id().len(),
            "resolved client id"
        );

        Ok(credentials)
    }
}

fn read_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|e| match e {
        std::env::VarError::NotPresent => Error::Config(format!("{name} is not set")),
        std::env::VarError::NotUnicode(_) => {
            Error::Config(format!("{name} is not valid unicode"))
        }
    })
}

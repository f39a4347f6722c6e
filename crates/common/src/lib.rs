//! Shared types for the Threads token exchange workspace

mod credentials;
mod error;
mod secret;

pub use credentials::{
    CLIENT_ID_VAR, CLIENT_SECRET_VAR, ClientCredentials, CredentialSource, EnvCredentials,
};
pub use error::{Error, Result};
pub use secret::Secret;

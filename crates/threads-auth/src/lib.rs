//! Threads OAuth token exchange library
//!
//! Completes the authorization-code leg of the Threads OAuth flow and renders
//! the outcome as a `thuft://` callback URI for the mobile app. This crate has
//! no dependency on the HTTP server binary and can be tested on its own.
//!
//! Flow:
//! 1. The mobile app sends the user through Threads authorization
//! 2. Threads redirects the browser to our function with `?code=...`
//! 3. The function calls `token::exchange_code()` with that code
//! 4. `callback::callback_uri()` turns the result into the app redirect

pub mod callback;
pub mod constants;
pub mod error;
pub mod token;

pub use callback::{callback_uri, error_uri, success_uri};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{TokenEndpoint, TokenGrant, UserId, exchange_code, http_client};

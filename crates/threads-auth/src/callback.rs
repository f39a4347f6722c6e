//! Callback URIs for the mobile app
//!
//! Success parameters are embedded verbatim: the app parses `access_token`
//! and `user_id` without decoding. Error messages are percent-encoded since
//! provider messages routinely contain spaces and punctuation.

use crate::error::Result;
use crate::token::TokenGrant;

/// `<base>?access_token=<token>&user_id=<user_id>`
pub fn success_uri(base: &str, grant: &TokenGrant) -> String {
    let user_id = grant
        .user_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!(
        "{base}?access_token={}&user_id={user_id}",
        grant.access_token
    )
}

/// `<base>?error=<percent-encoded message>`
pub fn error_uri(base: &str, message: &str) -> String {
    format!("{base}?error={}", urlencoding::encode(message))
}

/// Render an exchange outcome as the app callback URI.
pub fn callback_uri(base: &str, outcome: &Result<TokenGrant>) -> String {
    match outcome {
        Ok(grant) => success_uri(base, grant),
        Err(e) => error_uri(base, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CALLBACK_URI;
    use crate::error::Error;
    use crate::token::UserId;

    fn grant(token: &str, user_id: Option<UserId>) -> TokenGrant {
        TokenGrant {
            access_token: token.into(),
            user_id,
        }
    }

    #[test]
    fn success_embeds_values_verbatim() {
        let uri = success_uri(
            CALLBACK_URI,
            &grant("THQWJYa+b/c=", Some(UserId::Text("1789".into()))),
        );
        assert_eq!(
            uri,
            "thuft://callback?access_token=THQWJYa+b/c=&user_id=1789"
        );
    }

    #[test]
    fn numeric_user_id_renders_as_digits() {
        let user_id: UserId = serde_json::from_str("25118439091234567").unwrap();
        let uri = success_uri(CALLBACK_URI, &grant("tok", Some(user_id)));
        assert_eq!(
            uri,
            "thuft://callback?access_token=tok&user_id=25118439091234567"
        );
    }

    #[test]
    fn missing_user_id_renders_empty() {
        let uri = success_uri(CALLBACK_URI, &grant("tok", None));
        assert_eq!(uri, "thuft://callback?access_token=tok&user_id=");
    }

    #[test]
    fn error_message_is_percent_encoded() {
        assert_eq!(
            error_uri(CALLBACK_URI, "Invalid code"),
            "thuft://callback?error=Invalid%20code"
        );
        assert_eq!(
            error_uri(CALLBACK_URI, "a&b=c?"),
            "thuft://callback?error=a%26b%3Dc%3F"
        );
    }

    #[test]
    fn callback_uri_picks_the_variant() {
        let ok: Result<TokenGrant> = Ok(grant("tok", Some(UserId::Text("7".into()))));
        assert_eq!(
            callback_uri(CALLBACK_URI, &ok),
            "thuft://callback?access_token=tok&user_id=7"
        );

        let err: Result<TokenGrant> = Err(Error::MissingToken);
        assert_eq!(
            callback_uri(CALLBACK_URI, &err),
            "thuft://callback?error=Access%20token%20not%20found%20in%20response"
        );
    }
}

//! Authorization header construction.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;

use crate::transport::set_header;
use harbor_core::AuthSpec;

/// Header used for API keys when the caller names none.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// `Basic` header value for a user name and password.
pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// `Bearer` header value, adding the prefix when the token lacks it.
pub fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_owned()
    } else {
        format!("Bearer {token}")
    }
}

/// Header value for a consumer endpoint credential.
///
/// Values already carrying a `Basic ` or `Bearer ` scheme are used verbatim;
/// anything else is treated as raw `user:password` and base64 encoded.
pub fn consumer_authorization(credential: &str) -> String {
    let lowered = credential.to_ascii_lowercase();
    if lowered.starts_with("basic ") || lowered.starts_with("bearer ") {
        credential.to_owned()
    } else {
        format!("Basic {}", STANDARD.encode(credential))
    }
}

/// Adds the header an [`AuthSpec`] describes. Incomplete specs add nothing.
pub fn apply(headers: &mut BTreeMap<String, String>, auth: &AuthSpec) {
    match auth {
        AuthSpec::Basic {
            username: Some(username),
            password: Some(password),
        } if !username.is_empty() && !password.is_empty() => {
            set_header(headers, "Authorization", basic(username, password));
        }
        AuthSpec::Bearer { token: Some(token) } if !token.is_empty() => {
            set_header(headers, "Authorization", format!("Bearer {token}"));
        }
        AuthSpec::ApiKey {
            key: Some(key),
            header_name,
        } if !key.is_empty() => {
            let name = header_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_API_KEY_HEADER);
            set_header(headers, name, key.clone());
        }
        _ => {}
    }
}

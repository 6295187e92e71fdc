use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Build an HTTP Basic `Authorization` header value.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let token = STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

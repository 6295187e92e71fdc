//! Hand-framed HTTP/1.1 request for the streaming endpoint

use bytes::Bytes;
use contracts::UpstreamConfig;
use url::form_urlencoded;

use crate::error::{Result, StreamError};

/// Prebuilt request: header block plus URL-encoded body
#[derive(Debug, Clone)]
pub struct StreamRequest {
    head: Bytes,
    body: Bytes,
}

impl StreamRequest {
    /// Build the request for `config` with the given filter parameters
    pub fn new(config: &UpstreamConfig, params: &[(String, String)]) -> Self {
        let body = encode_form(params);

        let mut lines = vec![
            format!("POST {} HTTP/1.1", config.path),
            format!("Host: {}", config.host),
            format!("Content-Length: {}", body.len()),
            "Content-Type: application/x-www-form-urlencoded".to_string(),
        ];
        if let Some(auth) = config.authorization() {
            lines.push(format!("Authorization: {auth}"));
        }
        lines.extend(config.headers.iter().map(|(k, v)| format!("{k}: {v}")));
        lines.push(String::new());
        lines.push(String::new());

        Self {
            head: Bytes::from(lines.join("\r\n")),
            body: Bytes::from(body),
        }
    }

    /// Request line and headers, terminated by a blank line
    pub fn head(&self) -> &Bytes {
        &self.head
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// `application/x-www-form-urlencoded` encoding of `params`
pub fn encode_form(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Parse the numeric code out of `HTTP/1.1 200 OK`
pub fn parse_status_line(line: &[u8]) -> Result<u16> {
    let text = String::from_utf8_lossy(line);
    text.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| StreamError::MalformedStatus(text.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            host: "stream.example.com".into(),
            port: 80,
            path: "/1/statuses/filter.json".into(),
            username: Some("user".into()),
            password: Some("pass".into()),
            headers: BTreeMap::from([("User-Agent".to_string(), "relay".to_string())]),
            timeout_secs: 61.0,
            tcp_backoff: contracts::BackoffConfig::new(0.25, 16.0),
            http_backoff: contracts::BackoffConfig::new(10.0, 240.0),
            max_item_bytes: 1024,
        }
    }

    #[test]
    fn header_block_layout() {
        let params = vec![("track".to_string(), "rust lang".to_string())];
        let request = StreamRequest::new(&upstream(), &params);

        assert_eq!(request.body().as_ref(), b"track=rust+lang");
        let head = std::str::from_utf8(request.head()).unwrap();
        assert_eq!(
            head,
            "POST /1/statuses/filter.json HTTP/1.1\r\n\
             Host: stream.example.com\r\n\
             Content-Length: 15\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Authorization: Basic dXNlcjpwYXNz\r\n\
             User-Agent: relay\r\n\
             \r\n"
        );
    }

    #[test]
    fn form_encoding_escapes() {
        let params = vec![
            ("follow".to_string(), "1,2".to_string()),
            ("track".to_string(), "a&b=c".to_string()),
        ];
        assert_eq!(encode_form(&params), "follow=1%2C2&track=a%26b%3Dc");
    }

    #[test]
    fn status_line() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK").unwrap(), 200);
        assert_eq!(parse_status_line(b"HTTP/1.0 503").unwrap(), 503);
        assert!(matches!(
            parse_status_line(b"garbage"),
            Err(StreamError::MalformedStatus(_))
        ));
    }
}

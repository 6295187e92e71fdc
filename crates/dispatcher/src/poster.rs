//! Delivery of a batch to the downstream endpoint

use bytes::Bytes;
use contracts::ProcessorConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, instrument};
use url::form_urlencoded::byte_serialize;

use crate::error::{DispatcherError, Result};

/// Sends one batch; `Ok` only when the destination accepted it.
#[trait_variant::make(BatchPoster: Send)]
pub trait LocalBatchPoster {
    async fn post(&self, items: &[Bytes]) -> Result<()>;
}

/// `application/x-www-form-urlencoded` body with `field` repeated per item
pub fn form_body(field: &str, items: &[Bytes]) -> String {
    let field: String = byte_serialize(field.as_bytes()).collect();
    items
        .iter()
        .map(|item| format!("{field}={}", byte_serialize(item).collect::<String>()))
        .collect::<Vec<_>>()
        .join("&")
}

/// POSTs batches over HTTP(S); any 2xx counts as delivered
#[derive(Debug, Clone)]
pub struct HttpPoster {
    client: Client,
    url: String,
    field_name: String,
    headers: HeaderMap,
}

impl HttpPoster {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        if let Some(auth) = config.authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| DispatcherError::config(format!("authorization header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DispatcherError::config(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DispatcherError::config(format!("header '{name}': {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            field_name: config.field_name.clone(),
            headers,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl BatchPoster for HttpPoster {
    #[instrument(name = "http_post_batch", skip(self, items), fields(url = %self.url, items = items.len()))]
    async fn post(&self, items: &[Bytes]) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(form_body(&self.field_name, items))
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "destination answered");
        if status.is_success() {
            Ok(())
        } else {
            Err(DispatcherError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BackoffConfig, TransformKind};
    use std::collections::BTreeMap;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn processor_config(url: String) -> ProcessorConfig {
        ProcessorConfig {
            ready_list_id: "ready".into(),
            num_items: 10,
            url,
            username: Some("user".into()),
            password: Some("pass".into()),
            headers: BTreeMap::from([("X-Relay".to_string(), "1".to_string())]),
            backoff: BackoffConfig::new(2.0, 3600.0),
            transform: TransformKind::None,
            field_name: "items".into(),
            timeout_secs: 5.0,
        }
    }

    /// One-shot HTTP server: returns the raw request head and body
    async fn destination(status: u16) -> (String, mpsc::Receiver<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hooks/batch", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                if line == "\r\n" {
                    break;
                }
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            reader.get_mut().write_all(response.as_bytes()).await.unwrap();
            tx.send((head, String::from_utf8(body).unwrap())).await.unwrap();
        });
        (url, rx)
    }

    #[test]
    fn body_repeats_the_field() {
        let items = [Bytes::from_static(b"a b"), Bytes::from_static(b"{\"x\":1}")];
        assert_eq!(
            form_body("items", &items),
            "items=a+b&items=%7B%22x%22%3A1%7D"
        );
        assert_eq!(form_body("items", &[]), "");
    }

    #[tokio::test]
    async fn posts_form_with_credentials() {
        let (url, mut rx) = destination(204).await;
        let poster = HttpPoster::new(&processor_config(url)).unwrap();

        BatchPoster::post(&poster, &[Bytes::from_static(b"one"), Bytes::from_static(b"two")])
            .await
            .unwrap();

        let (head, body) = rx.recv().await.unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /hooks/batch http/1.1"));
        assert!(head.contains("authorization: basic dxnlcjpwyxnz"));
        assert!(head.contains("content-type: application/x-www-form-urlencoded"));
        assert!(head.contains("x-relay: 1"));
        assert_eq!(body, "items=one&items=two");
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let (url, _rx) = destination(503).await;
        let poster = HttpPoster::new(&processor_config(url)).unwrap();
        let err = BatchPoster::post(&poster, &[Bytes::from_static(b"x")]).await.unwrap_err();
        assert!(matches!(err, DispatcherError::Status(503)));
        assert!(err.is_posting_failure());
    }

    #[test]
    fn invalid_header_is_rejected() {
        let mut config = processor_config("http://localhost/".into());
        config.headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            HttpPoster::new(&config),
            Err(DispatcherError::Config(_))
        ));
    }
}

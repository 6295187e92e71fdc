//! Stream consumer - one upstream connection with an infinite retry loop
//!
//! ```text
//! CONNECTING -> READING_HEADERS -> STREAMING -> (CLOSED | ERROR)
//!      ^              |   |                           |
//!      |  status>500  |   | other non-200             |
//!      +--------------+   +--> stop, no Exit          |
//!      +------------ recoverable error <--------------+
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use contracts::{ConsumerId, Event, HttpBackoff, LinearBackoff, UpstreamConfig};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::chunked::ChunkedReader;
use crate::error::{Result, StreamError};
use crate::framer::DataFramer;
use crate::metrics::IngestionMetrics;
use crate::notifier::EventNotifier;
use crate::request::{parse_status_line, StreamRequest};

/// How a consumer task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Killed through its handle; no `Exit` emitted
    Cancelled,
    /// Upstream answered a non-retryable status; no `Exit` emitted
    Rejected(u16),
    /// Unexpected failure; `Exit` emitted
    Failed(String),
    /// Event notifier closed underneath the consumer
    Detached,
    /// Task panicked
    Panicked,
}

/// Result of one connection attempt that did not reach STREAMING
enum Attempt {
    Retry(u16),
    Rejected(u16),
}

/// One upstream connection owner. Never reused: build a fresh one per start.
pub struct Consumer<F> {
    id: ConsumerId,
    host: String,
    port: u16,
    request: StreamRequest,
    timeout: Duration,
    tcp_backoff: LinearBackoff,
    http_backoff: HttpBackoff,
    framer: F,
    notifier: EventNotifier,
    metrics: Arc<IngestionMetrics>,
}

impl<F: DataFramer + Send + Sync + 'static> Consumer<F> {
    pub fn new(
        config: &UpstreamConfig,
        params: &[(String, String)],
        framer: F,
        notifier: EventNotifier,
        metrics: Arc<IngestionMetrics>,
    ) -> Self {
        Self {
            id: ConsumerId::generate(),
            host: config.host.clone(),
            port: config.port,
            request: StreamRequest::new(config, params),
            timeout: config.timeout(),
            tcp_backoff: LinearBackoff::new(&config.tcp_backoff),
            http_backoff: HttpBackoff::new(&config.http_backoff),
            framer,
            notifier,
            metrics,
        }
    }

    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    /// Run the consumer on its own task
    pub fn spawn(self) -> ConsumerHandle {
        let id = self.id.clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(cancel_rx));
        ConsumerHandle {
            id,
            cancel_tx,
            task,
        }
    }

    /// Retry loop. Returns once cancelled, rejected or failed.
    #[instrument(name = "consumer_run", skip(self, cancel), fields(consumer_id = %self.id))]
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> ConsumerExit {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => None,
                outcome = self.attempt() => Some(outcome),
            };
            let Some(outcome) = outcome else {
                debug!(consumer_id = %self.id, "consumer cancelled");
                return ConsumerExit::Cancelled;
            };

            let delay = match outcome {
                Ok(Attempt::Retry(status)) => {
                    let delay = self.http_backoff.increment();
                    self.metrics.record_http_retry(status, delay);
                    if self.http_backoff.is_saturated() {
                        warn!(consumer_id = %self.id, "consumer reached max http delay");
                    }
                    warn!(
                        consumer_id = %self.id,
                        status,
                        delay_ms = delay.as_millis() as u64,
                        "upstream error status, backing off"
                    );
                    delay
                }
                Ok(Attempt::Rejected(status)) => {
                    self.metrics.record_rejection(status);
                    error!(
                        consumer_id = %self.id,
                        status,
                        "upstream rejected request, consumer stopped"
                    );
                    return ConsumerExit::Rejected(status);
                }
                Err(StreamError::NotifierClosed) => {
                    debug!(consumer_id = %self.id, "event notifier closed");
                    return ConsumerExit::Detached;
                }
                Err(e) if e.is_recoverable() => {
                    let delay = self.tcp_backoff.increment();
                    self.metrics.record_tcp_retry(delay);
                    if self.tcp_backoff.is_saturated() {
                        warn!(consumer_id = %self.id, "consumer reached max tcp ip delay");
                    }
                    info!(
                        consumer_id = %self.id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "connection failed, backing off"
                    );
                    delay
                }
                Err(e) => {
                    error!(consumer_id = %self.id, error = %e, "fatal error in consumer");
                    return self.exit(e).await;
                }
            };

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    debug!(consumer_id = %self.id, "consumer cancelled during backoff");
                    return ConsumerExit::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn exit(&self, err: StreamError) -> ConsumerExit {
        self.metrics.record_exit();
        if self.notifier.notify(Event::Exit(self.id.clone())).await.is_err() {
            return ConsumerExit::Detached;
        }
        ConsumerExit::Failed(err.to_string())
    }

    /// CONNECTING -> READING_HEADERS -> STREAMING. The socket is dropped on return.
    async fn attempt(&mut self) -> Result<Attempt> {
        let stream = self.connect().await?;
        let mut reader = ChunkedReader::with_timeout(stream, self.timeout);

        let status = parse_status_line(&reader.read_line().await?)?;
        if status != 200 {
            return Ok(if status > 500 {
                Attempt::Retry(status)
            } else {
                Attempt::Rejected(status)
            });
        }
        skip_headers(&mut reader).await?;

        self.tcp_backoff.reset();
        self.http_backoff.reset();
        self.metrics.record_connect();
        info!(consumer_id = %self.id, host = %self.host, "connected, streaming");
        self.notifier.notify(Event::Connect(self.id.clone())).await?;

        loop {
            let Some(item) = self.framer.next_item(&mut reader).await? else {
                continue;
            };
            if item.is_empty() {
                continue;
            }
            self.metrics.record_item(item.len());
            self.notifier.notify(Event::Data(item)).await?;
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let mut stream = tokio::time::timeout(self.timeout, open_socket(&self.host, self.port))
            .await
            .map_err(|_| StreamError::Timeout(self.timeout))??;

        let send = async {
            stream.write_all(self.request.head()).await?;
            stream.write_all(self.request.body()).await?;
            stream.flush().await
        };
        tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| StreamError::Timeout(self.timeout))??;
        Ok(stream)
    }
}

async fn open_socket(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;
        match socket.connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"))
    }))
}

/// Discard response headers up to the blank line
async fn skip_headers<R: AsyncRead + Unpin>(reader: &mut ChunkedReader<R>) -> Result<()> {
    while !reader.read_line().await?.is_empty() {}
    Ok(())
}

/// Resolves once cancellation is requested or the handle is dropped
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

/// Handle to a running consumer task
pub struct ConsumerHandle {
    id: ConsumerId,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<ConsumerExit>,
}

impl ConsumerHandle {
    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the consumer and wait until its socket is released
    #[instrument(name = "consumer_kill", skip(self), fields(consumer_id = %self.id))]
    pub async fn kill(self) -> ConsumerExit {
        let _ = self.cancel_tx.send(true);
        self.join().await
    }

    /// Wait for the consumer to end on its own
    pub async fn join(self) -> ConsumerExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(consumer_id = %self.id, error = ?e, "consumer task panicked");
                ConsumerExit::Panicked
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::encode_chunks;
    use crate::framer::LengthDelimitedFramer;
    use contracts::BackoffConfig;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn upstream(port: u16) -> UpstreamConfig {
        UpstreamConfig {
            host: "127.0.0.1".into(),
            port,
            path: "/stream".into(),
            username: None,
            password: None,
            headers: BTreeMap::new(),
            timeout_secs: 5.0,
            tcp_backoff: BackoffConfig::new(0.01, 0.05),
            http_backoff: BackoffConfig::new(0.01, 0.05),
            max_item_bytes: 64,
        }
    }

    fn consumer(port: u16, notifier: &EventNotifier) -> Consumer<LengthDelimitedFramer> {
        Consumer::new(
            &upstream(port),
            &[("track".to_string(), "rust".to_string())],
            LengthDelimitedFramer::new(64),
            notifier.clone(),
            Arc::new(IngestionMetrics::new()),
        )
    }

    /// Accepts connections forever and answers each with `response`
    async fn serve(response: Vec<u8>, hold_open: bool) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&response).await;
                    if hold_open {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    } else {
                        let _ = socket.shutdown().await;
                        while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                    }
                });
            }
        });
        (port, accepted)
    }

    fn chunked_response(parts: &[&[u8]]) -> Vec<u8> {
        let mut response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nContent-Type: application/json\r\n\r\n"
                .to_vec();
        let body = encode_chunks(parts);
        // leave the terminating chunk off so the stream stays open
        response.extend_from_slice(&body[..body.len() - 5]);
        response
    }

    #[tokio::test]
    async fn streams_items_then_cancels_silently() {
        let (port, _) = serve(chunked_response(&[b"3\r\nabc", b"\r\n2\r\nxy\r\n"]), true).await;
        let notifier = EventNotifier::new();
        let handle = consumer(port, &notifier).spawn();
        let id = handle.id().clone();

        assert_eq!(notifier.next().await, Some(Event::Connect(id)));
        assert_eq!(notifier.next().await, Some(Event::Data("abc".into())));
        assert_eq!(notifier.next().await, Some(Event::Data("xy".into())));

        assert_eq!(handle.kill().await, ConsumerExit::Cancelled);
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn client_error_status_stops_without_exit() {
        let (port, accepted) = serve(b"HTTP/1.1 401 Unauthorized\r\n\r\n".to_vec(), false).await;
        let notifier = EventNotifier::new();
        let handle = consumer(port, &notifier).spawn();

        assert_eq!(handle.join().await, ConsumerExit::Rejected(401));
        assert!(notifier.is_empty());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_500_is_not_retried() {
        let (port, _) = serve(b"HTTP/1.1 500 Internal\r\n\r\n".to_vec(), false).await;
        let notifier = EventNotifier::new();
        let handle = consumer(port, &notifier).spawn();
        assert_eq!(handle.join().await, ConsumerExit::Rejected(500));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let (port, accepted) = serve(b"HTTP/1.1 503 Busy\r\n\r\n".to_vec(), false).await;
        let notifier = EventNotifier::new();
        let handle = consumer(port, &notifier).spawn();

        tokio::time::timeout(Duration::from_secs(5), async {
            while accepted.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(handle.kill().await, ConsumerExit::Cancelled);
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn closed_stream_reconnects() {
        let (port, accepted) = serve(chunked_response(&[b"1\r\na"]), false).await;
        let notifier = EventNotifier::new();
        let handle = consumer(port, &notifier).spawn();

        let mut connects = 0;
        while connects < 2 {
            if let Some(Event::Connect(_)) = notifier.next().await {
                connects += 1;
            }
        }
        assert!(accepted.load(Ordering::SeqCst) >= 2);
        assert_eq!(handle.kill().await, ConsumerExit::Cancelled);
    }

    #[tokio::test]
    async fn connect_resets_the_tcp_backoff() {
        // three dropped connects, one stream that closes, then one held open
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut sockets = Vec::new();
            for n in 0.. {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                match n {
                    0..=2 => drop(socket),
                    3 => {
                        let _ = socket.write_all(&chunked_response(&[b"1\r\na"])).await;
                        let _ = socket.shutdown().await;
                    }
                    _ => {
                        let _ = socket.write_all(&chunked_response(&[])).await;
                        sockets.push(socket);
                    }
                }
            }
        });

        let notifier = EventNotifier::new();
        let metrics = Arc::new(IngestionMetrics::new());
        let handle = Consumer::new(
            &upstream(port),
            &[("track".to_string(), "rust".to_string())],
            LengthDelimitedFramer::new(64),
            notifier.clone(),
            metrics.clone(),
        )
        .spawn();

        let mut connects = 0;
        while connects < 2 {
            if let Some(Event::Connect(_)) = notifier.next().await {
                connects += 1;
            }
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tcp_retries, 4);
        assert_eq!(snapshot.connects, 2);
        // 10ms after the reset, not the 40ms the fourth failure would give
        assert_eq!(snapshot.last_retry_delay_ms, 10);
        assert_eq!(handle.kill().await, ConsumerExit::Cancelled);
    }

    #[tokio::test]
    async fn oversized_item_exits() {
        let (port, _) = serve(chunked_response(&[b"100\r\n"]), true).await;
        let notifier = EventNotifier::new();
        let handle = consumer(port, &notifier).spawn();
        let id = handle.id().clone();

        assert_eq!(notifier.next().await, Some(Event::Connect(id.clone())));
        assert!(matches!(handle.join().await, ConsumerExit::Failed(_)));
        assert_eq!(notifier.next().await, Some(Event::Exit(id)));
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let (port, _) = serve(chunked_response(&[]), true).await;
        let notifier = EventNotifier::new();
        let consumer = consumer(port, &notifier);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(cancel_rx));

        assert!(matches!(notifier.next().await, Some(Event::Connect(_))));
        drop(cancel_tx);
        assert_eq!(task.await.unwrap(), ConsumerExit::Cancelled);
    }
}

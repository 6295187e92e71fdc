//! Chunked transfer decoding directly on a byte stream
//!
//! `ChunkedReader` turns a raw socket into logical reads. Chunk-size lines,
//! chunk bodies and the CRLF after each chunk are consumed transparently; a
//! partially read chunk is remembered across calls.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::{Result, StreamError};

/// Upper bound for a single status, header or chunk-size line
pub const MAX_LINE_BYTES: usize = 64 * 1024;

async fn timed<T>(limit: Option<Duration>, fut: impl Future<Output = io::Result<T>>) -> Result<T> {
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StreamError::Timeout(limit))?,
        None => fut.await,
    };
    result.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => StreamError::ConnectionClosed,
        _ => StreamError::Io(e),
    })
}

fn trim_end(mut line: Vec<u8>) -> Bytes {
    let keep = line.trim_ascii_end().len();
    line.truncate(keep);
    Bytes::from(line)
}

/// Reader over a (possibly chunk-encoded) HTTP byte stream
pub struct ChunkedReader<R> {
    inner: BufReader<R>,
    read_timeout: Option<Duration>,
    /// Bytes left in the current chunk; `None` means a size line comes next
    chunk_left: Option<usize>,
    /// Terminating zero-size chunk seen
    finished: bool,
}

impl<R: AsyncRead + Unpin> ChunkedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            read_timeout: None,
            chunk_left: None,
            finished: false,
        }
    }

    /// Every individual socket read fails with `Timeout` after `timeout`
    pub fn with_timeout(reader: R, timeout: Duration) -> Self {
        Self {
            read_timeout: Some(timeout),
            ..Self::new(reader)
        }
    }

    /// Chunked body ended with a zero-size chunk
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let limit = self.read_timeout;
        let mut filled = 0;
        while filled < buf.len() {
            let n = timed(limit, self.inner.read(&mut buf[filled..])).await?;
            if n == 0 {
                return Err(StreamError::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }

    /// Read exactly `n` raw bytes
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Read raw bytes up to `\n`, trailing whitespace stripped
    pub async fn read_line(&mut self) -> Result<Bytes> {
        let limit = self.read_timeout;
        let mut line = Vec::new();
        loop {
            let (done, used) = {
                let available = timed(limit, self.inner.fill_buf()).await?;
                if available.is_empty() {
                    return Err(StreamError::ConnectionClosed);
                }
                match available.iter().position(|b| *b == b'\n') {
                    Some(i) => {
                        line.extend_from_slice(&available[..=i]);
                        (true, i + 1)
                    }
                    None => {
                        line.extend_from_slice(available);
                        (false, available.len())
                    }
                }
            };
            self.inner.consume(used);
            if done {
                return Ok(trim_end(line));
            }
            if line.len() > MAX_LINE_BYTES {
                return Err(StreamError::LineTooLong {
                    limit: MAX_LINE_BYTES,
                });
            }
        }
    }

    async fn read_chunk_size(&mut self) -> Result<usize> {
        let line = self.read_line().await?;
        let size = line.split(|b| *b == b';').next().unwrap_or_default();
        std::str::from_utf8(size)
            .ok()
            .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
            .ok_or_else(|| StreamError::LostChunkSync {
                line: String::from_utf8_lossy(&line).into_owned(),
            })
    }

    /// Consume the CRLF that follows every chunk body
    async fn end_chunk(&mut self) -> Result<()> {
        let crlf = self.read_exact(2).await?;
        if crlf.as_ref() != b"\r\n" {
            return Err(StreamError::LostChunkSync {
                line: String::from_utf8_lossy(&crlf).into_owned(),
            });
        }
        self.chunk_left = None;
        Ok(())
    }

    /// Discard trailer lines after the zero-size chunk
    async fn finish(&mut self) -> Result<()> {
        while !self.read_line().await?.is_empty() {}
        self.chunk_left = None;
        self.finished = true;
        Ok(())
    }

    async fn append(&mut self, out: &mut BytesMut, n: usize) -> Result<()> {
        let start = out.len();
        out.resize(start + n, 0);
        self.fill(&mut out[start..]).await
    }

    /// Read `amount` logical bytes from the chunked body, or everything up to
    /// the terminating chunk when `amount` is `None`.
    ///
    /// Returns fewer bytes than requested only when the body ends.
    pub async fn read_chunked(&mut self, amount: Option<usize>) -> Result<Bytes> {
        let mut out = BytesMut::new();
        if self.finished || amount == Some(0) {
            return Ok(out.freeze());
        }

        let mut wanted = amount;
        loop {
            let left = match self.chunk_left {
                Some(left) => left,
                None => {
                    let size = self.read_chunk_size().await?;
                    if size == 0 {
                        self.finish().await?;
                        return Ok(out.freeze());
                    }
                    size
                }
            };

            match wanted {
                None => {
                    self.append(&mut out, left).await?;
                    self.end_chunk().await?;
                }
                Some(n) if n < left => {
                    self.append(&mut out, n).await?;
                    self.chunk_left = Some(left - n);
                    return Ok(out.freeze());
                }
                Some(n) if n == left => {
                    self.append(&mut out, n).await?;
                    self.end_chunk().await?;
                    return Ok(out.freeze());
                }
                Some(n) => {
                    self.append(&mut out, left).await?;
                    self.end_chunk().await?;
                    wanted = Some(n - left);
                }
            }
        }
    }

    /// `read_line` sourced through `read_chunked`
    pub async fn read_line_chunked(&mut self) -> Result<Bytes> {
        let mut line = Vec::new();
        loop {
            let byte = self.read_chunked(Some(1)).await?;
            match byte.first() {
                None => return Err(StreamError::ConnectionClosed),
                Some(b'\n') => return Ok(trim_end(line)),
                Some(b) => line.push(*b),
            }
            if line.len() > MAX_LINE_BYTES {
                return Err(StreamError::LineTooLong {
                    limit: MAX_LINE_BYTES,
                });
            }
        }
    }
}

/// Chunk-encode `parts`, one chunk each, followed by the terminating chunk.
#[cfg(test)]
pub(crate) fn encode_chunks(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

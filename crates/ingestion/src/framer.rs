//! Feed-specific framing of logical items inside the chunked body

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::chunked::ChunkedReader;
use crate::error::{Result, StreamError};

/// Produces one logical item per call.
///
/// `Ok(None)` means the call consumed something that is not an item
/// (e.g. a keep-alive newline); the consumer simply calls again.
#[trait_variant::make(DataFramer: Send)]
pub trait LocalDataFramer {
    async fn next_item<R: AsyncRead + Unpin + Send>(
        &self,
        reader: &mut ChunkedReader<R>,
    ) -> Result<Option<Bytes>>;
}

/// Decimal length line followed by exactly that many bytes.
#[derive(Debug, Clone)]
pub struct LengthDelimitedFramer {
    max_item_bytes: usize,
}

impl LengthDelimitedFramer {
    pub fn new(max_item_bytes: usize) -> Self {
        Self { max_item_bytes }
    }
}

impl DataFramer for LengthDelimitedFramer {
    async fn next_item<R: AsyncRead + Unpin + Send>(
        &self,
        reader: &mut ChunkedReader<R>,
    ) -> Result<Option<Bytes>> {
        let line = reader.read_line_chunked().await?;
        if line.is_empty() || !line.iter().all(u8::is_ascii_digit) {
            return Ok(None);
        }

        let len: usize = std::str::from_utf8(&line)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(StreamError::ItemTooLarge {
                len: usize::MAX,
                max: self.max_item_bytes,
            })?;
        if len > self.max_item_bytes {
            return Err(StreamError::ItemTooLarge {
                len,
                max: self.max_item_bytes,
            });
        }

        let item = reader.read_chunked(Some(len)).await?;
        if item.len() < len {
            return Err(StreamError::ConnectionClosed);
        }
        Ok(Some(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::encode_chunks;

    #[tokio::test]
    async fn frames_items_split_across_chunks() {
        let body = encode_chunks(&[b"5\r\nhel", b"lo\r\n", b"\r\n3\r\nab", b"c"]);
        let mut reader = ChunkedReader::new(&body[..]);
        let framer = LengthDelimitedFramer::new(1024);

        assert_eq!(DataFramer::next_item(&framer, &mut reader).await.unwrap().unwrap(), "hello");
        // blank keep-alive lines
        assert_eq!(DataFramer::next_item(&framer, &mut reader).await.unwrap(), None);
        assert_eq!(DataFramer::next_item(&framer, &mut reader).await.unwrap(), None);
        assert_eq!(DataFramer::next_item(&framer, &mut reader).await.unwrap().unwrap(), "abc");
        assert!(matches!(
            DataFramer::next_item(&framer, &mut reader).await,
            Err(StreamError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_items() {
        let body = encode_chunks(&[b"4096\r\n"]);
        let mut reader = ChunkedReader::new(&body[..]);
        let framer = LengthDelimitedFramer::new(1024);
        assert!(matches!(
            DataFramer::next_item(&framer, &mut reader).await,
            Err(StreamError::ItemTooLarge { len: 4096, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn non_numeric_lines_are_skipped() {
        let body = encode_chunks(&[b"{\"ping\":1}\r\n2\r\nok"]);
        let mut reader = ChunkedReader::new(&body[..]);
        let framer = LengthDelimitedFramer::new(1024);
        assert_eq!(DataFramer::next_item(&framer, &mut reader).await.unwrap(), None);
        assert_eq!(DataFramer::next_item(&framer, &mut reader).await.unwrap().unwrap(), "ok");
    }

    #[tokio::test]
    async fn truncated_item_is_connection_closed() {
        let body = encode_chunks(&[b"10\r\nshort"]);
        let mut reader = ChunkedReader::new(&body[..]);
        let framer = LengthDelimitedFramer::new(1024);
        assert!(matches!(
            DataFramer::next_item(&framer, &mut reader).await,
            Err(StreamError::ConnectionClosed)
        ));
    }
}

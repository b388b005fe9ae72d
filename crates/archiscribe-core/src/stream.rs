//! HTTP streaming with gzip decompression and byte counting.
//!
//! Response bodies are turned into `AsyncRead` via `tokio_util::io::StreamReader`,
//! counted *before* decompression (so progress tracks Content-Length), then
//! gunzipped with `async_compression`.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use tokio::io::{AsyncRead, BufReader, ReadBuf};
use tokio_util::io::StreamReader;

use crate::error::FetchError;

/// Process-wide HTTP settings, applied once at startup before the first request.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP settings. Later calls are ignored.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::warn!("HTTP config already set, ignoring {config:?}");
    }
}

/// Current HTTP settings (defaults if never set).
pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("archiscribe/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(http_config().connect_timeout)
        .pool_max_idle_per_host(8)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Buffer size for the decompressed stream (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Shared byte counter for progress tracking
pub type ByteCounter = Arc<AtomicU64>;

/// Type-erased HTTP response body
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// Buffered, decompressed view over a byte-counted gzip source
pub type GzipStream<R> = BufReader<GzipDecoder<BufReader<CountingReader<R>>>>;

/// HTTP GET → byte counter → gunzip → buffered reader
///
/// Returns (reader, byte_counter, total_bytes). `total_bytes` is the
/// compressed Content-Length when the server sent one.
pub async fn open_gzip_stream(
    url: &str,
) -> Result<(GzipStream<BodyReader>, ByteCounter, Option<u64>), FetchError> {
    let response = http_client()
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| FetchError::from_reqwest(&e))?;

    let total_bytes = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let body: BodyReader = Box::pin(StreamReader::new(
        response.bytes_stream().map_err(io::Error::other),
    ));
    let (reader, counter) = gzip_stream(body);
    Ok((reader, counter, total_bytes))
}

/// Wrap any compressed source in a counting gunzip reader.
pub fn gzip_stream<R: AsyncRead + Unpin>(inner: R) -> (GzipStream<R>, ByteCounter) {
    let counter = ByteCounter::default();
    let counting = CountingReader::new(inner, counter.clone());
    let mut decoder = GzipDecoder::new(BufReader::new(counting));
    decoder.multiple_members(true);
    (BufReader::with_capacity(GZIP_BUF_SIZE, decoder), counter)
}

/// Reader wrapper that tracks bytes actually consumed from `inner`.
///
/// Only the bytes a read returned are added; a read that yields nothing adds
/// nothing, whatever the size of the caller's buffer.
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, count: ByteCounter) -> Self {
        Self { inner, count }
    }

    /// Bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            self.count.fetch_add(n as u64, Ordering::Relaxed);
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt};

    /// Serves scripted chunks; an empty chunk is a zero-byte read mid-stream.
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Scripted {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    impl AsyncRead for Scripted {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(chunk) = self.chunks.pop_front() {
                buf.put_slice(&chunk);
            }
            Poll::Ready(Ok(()))
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn counts_exact_length() {
        let data = vec![7u8; 10_000];
        let counter = ByteCounter::default();
        let mut reader = CountingReader::new(io::Cursor::new(data), counter.clone());
        let mut out = Vec::new();
        Read::read_to_end(&mut reader, &mut out).unwrap();
        assert_eq!(out.len(), 10_000);
        assert_eq!(counter.load(Ordering::Relaxed), 10_000);
        assert_eq!(reader.bytes_read(), 10_000);
    }

    #[test]
    fn zero_byte_read_adds_nothing() {
        // A zero-byte read in the middle must not be credited with the
        // caller's buffer size.
        let counter = ByteCounter::default();
        let mut reader = CountingReader::new(
            Scripted::new(&[b"abc", b"", b"defg"]),
            counter.clone(),
        );
        let mut buf = [0u8; 64];
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 0);
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(Read::read(&mut reader, &mut buf).unwrap(), 0);
        assert_eq!(counter.load(Ordering::Relaxed), 7);
    }

    #[tokio::test]
    async fn async_zero_byte_read_adds_nothing() {
        let counter = ByteCounter::default();
        let mut reader = CountingReader::new(
            Scripted::new(&[b"abc", b"", b"defg", b""]),
            counter.clone(),
        );
        let mut buf = [0u8; 64];
        let mut total = 0;
        for _ in 0..4 {
            total += AsyncReadExt::read(&mut reader, &mut buf).await.unwrap();
        }
        assert_eq!(total, 7);
        assert_eq!(counter.load(Ordering::Relaxed), 7);
    }

    #[tokio::test]
    async fn gzip_stream_counts_compressed_bytes() {
        let text = "line one\nline two\nline three\n".repeat(500);
        let compressed = gzip(text.as_bytes());

        let (mut reader, counter) = gzip_stream(compressed.as_slice());
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();

        assert_eq!(out, text);
        assert_eq!(counter.load(Ordering::Relaxed), compressed.len() as u64);
    }

    #[tokio::test]
    async fn gzip_stream_multiple_members() {
        let mut compressed = gzip(b"first\n");
        compressed.extend(gzip(b"second\n"));

        let (reader, _) = gzip_stream(compressed.as_slice());
        let mut lines = reader.lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[test]
    fn http_config_defaults() {
        let cfg = HttpConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_retries, 3);
    }
}

//! Archiscribe Core - Common infrastructure for the line cache
//!
//! HTTP access, byte-counted gzip streaming, retry policy, logging,
//! progress bars and shutdown handling shared by the cache and the
//! archive adapters.

pub mod error;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod stream;

// Re-exports for convenience
pub use error::FetchError;
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress};
pub use retry::{backoff_duration, capped_backoff, get_text_with_retry};
pub use shutdown::cancel_on_ctrl_c;
pub use stream::{
    ByteCounter, CountingReader, GzipStream, HttpConfig, gzip_stream, http_client, http_config,
    open_gzip_stream, set_http_config,
};

//! Retry with exponential backoff for remote calls

use std::time::Duration;

use crate::error::FetchError;
use crate::stream::{http_client, http_config};

/// Longest wait between two attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...), at most [`MAX_BACKOFF`]
pub fn backoff_duration(attempt: u32) -> Duration {
    capped_backoff(Duration::from_secs(2), attempt, MAX_BACKOFF)
}

/// `base * 2^(attempt-1)`, capped. Attempt 0 means "no wait".
pub fn capped_backoff(base: Duration, attempt: u32, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(cap)
}

/// HTTP GET returning the body as text, retrying rate limits (429),
/// server errors (5xx) and transport failures.
///
/// Gives up after `max_retries` (from global [`HttpConfig`](crate::HttpConfig))
/// additional attempts, or immediately on a non-retryable status.
pub async fn get_text_with_retry(url: &str) -> Result<String, FetchError> {
    let max_retries = http_config().max_retries;
    let mut attempt = 0u32;
    loop {
        let result: Result<String, reqwest::Error> = async {
            http_client()
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        }
        .await;
        let result = result.map_err(|e| FetchError::from_reqwest(&e));

        match result {
            Ok(text) => return Ok(text),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff_duration(attempt);
                log::warn!("Request failed ({e}), retry {attempt}/{max_retries} in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

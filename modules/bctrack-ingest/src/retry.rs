use std::future::Future;
use std::time::Duration;

use tracing::warn;

use bctrack_common::Result;

const BASE_DELAY: Duration = Duration::from_millis(500);

/// Run `op`, retrying transient failures up to `retries` times with
/// exponential backoff. Non-transient errors (malformed records, database
/// failures) surface immediately.
pub async fn with_retry<T, F, Fut>(retries: u32, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = BASE_DELAY;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(attempt, error = %e, "Transient fetch failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

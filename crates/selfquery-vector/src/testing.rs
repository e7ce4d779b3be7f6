//! Helpers for tests against backends with eventual visibility.

use std::future::Future;
use std::time::{Duration, Instant};

use selfquery_core::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Re-run `probe` until `accept` holds or `within` elapses, then return the
/// last observed value either way. Probe errors are returned immediately.
pub async fn eventually<T, F, Fut, P>(within: Duration, mut probe: F, accept: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let deadline = Instant::now() + within;
    loop {
        let value = probe().await?;
        if accept(&value) || Instant::now() >= deadline {
            return Ok(value);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

//! Per-request cancellation and deadline.
//!
//! Every oracle and backend call receives a [`Context`]. Wrapping the call in
//! [`Context::run`] makes it abort as soon as the token is cancelled or the
//! deadline passes, dropping the in-flight future.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self.timeout = Some(timeout);
        self
    }

    /// Child context: cancelled with its parent, may carry a tighter deadline.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline, timeout: self.timeout }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail fast before starting work.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.remaining().is_some_and(|d| d.is_zero()) {
            return Err(self.timed_out());
        }
        Ok(())
    }

    fn timed_out(&self) -> Error {
        let timeout_ms = self.timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        tracing::debug!(timeout_ms, "context deadline exceeded");
        Error::Timeout { timeout_ms }
    }

    /// Drive `fut` to completion unless the context is cancelled or expires first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        match self.remaining() {
            Some(left) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(Error::Cancelled),
                    res = tokio::time::timeout(left, fut) => match res {
                        Ok(out) => out,
                        Err(_) => Err(self.timed_out()),
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(Error::Cancelled),
                    out = fut => out,
                }
            }
        }
    }
}

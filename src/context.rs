//! Per-request cancellation and deadline propagation.
//!
//! A [`RequestContext`] travels with every repository call. Collaborator calls
//! are raced against the context's cancellation token and deadline, so a
//! pending store or allocator call is abandoned as soon as the caller gives
//! up. Work already completed upstream is not rolled back.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{IpError, IpResult};

/// Cancellation and deadline carried by a single request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Context without a deadline that is only cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Drive `fut` to completion unless the request is cancelled or its
    /// deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> IpResult<T>
    where
        F: Future<Output = T>,
    {
        if self.token.is_cancelled() {
            return Err(IpError::Canceled);
        }
        if matches!(self.deadline, Some(deadline) if deadline <= Instant::now()) {
            return Err(IpError::DeadlineExceeded);
        }

        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(IpError::Canceled),
                _ = tokio::time::sleep_until(deadline) => Err(IpError::DeadlineExceeded),
                out = fut => Ok(out),
            },
            None => tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(IpError::Canceled),
                out = fut => Ok(out),
            },
        }
    }
}

//! Utils is shared functions and types for the engine

use std::{future::Future, time::Duration};

use k8s_openapi::chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Interval between two polls of the API server while waiting on the cluster.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Engine Context
///
/// Constructed once and handed to every component that talks to the cluster.
pub struct Context<C, K = UtcClock> {
    /// Cluster API collaborator
    pub cluster: C,
    /// Clock that provide the current time
    pub clock: K,
    /// How often readiness and deletion waits poll the API server
    pub poll_interval: Duration,
}

impl<C> Context<C, UtcClock> {
    /// Create new context
    pub fn new(cluster: C) -> Self {
        Context {
            cluster,
            clock: UtcClock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl<C, K> Context<C, K> {
    /// Use a different poll interval for waits.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }
}

/// Provides the current time.
pub trait Clock {
    /// Report the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Provides the current time using real time.
pub struct UtcClock;
impl Clock for UtcClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Drive a wait to completion unless it is cancelled or runs past its timeout.
///
/// Without a timeout the future is awaited for as long as it takes.
pub async fn bounded<T>(
    what: impl Into<String>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    let fut = async {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| Error::Timeout {
                    what: what.into(),
                    timeout,
                })?,
            None => fut.await,
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// Sleep for the given duration unless cancelled first.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

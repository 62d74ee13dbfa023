//! Transaction Status Poller
//!
//! Follows a submitted transaction until it leaves the non-terminal set or
//! the attempt budget runs out. A poll can be cancelled at any point through
//! a [`PollCancel`] owned by the flow; no fetch is issued after that.

use crate::backend::types::TransactionStatus;
use crate::backend::{BackendError, BackendResult, TransactionBackend};
use crate::config::FlowConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    /// The owning flow stopped the poll; no further fetches are issued.
    #[error("status polling cancelled")]
    Cancelled,

    #[error("status fetch failed: {0}")]
    Fetch(BackendError),
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Owner side of a poll cancellation signal.
#[derive(Debug)]
pub struct PollCancel {
    tx: watch::Sender<bool>,
}

impl PollCancel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for PollCancel {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the signal flips to `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn sleep_or_cancel(
    delay: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), PollError> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(PollError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Wait `initial_delay`, then fetch the status every `interval` until it
/// leaves the non-terminal set or `max_attempts` fetches have been made.
///
/// The last observed status is returned even if still non-terminal; the
/// caller decides what exhaustion means. `max_attempts == 0` is treated as 1.
pub async fn wait_for_terminal<F, Fut>(
    id: &str,
    mut fetch_status: F,
    initial_delay: Duration,
    interval: Duration,
    max_attempts: u32,
    mut cancel: watch::Receiver<bool>,
) -> Result<TransactionStatus, PollError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = BackendResult<TransactionStatus>>,
{
    let max_attempts = max_attempts.max(1);

    if *cancel.borrow() {
        return Err(PollError::Cancelled);
    }
    sleep_or_cancel(initial_delay, &mut cancel).await?;

    let mut attempt = 0;
    loop {
        attempt += 1;

        let status = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return Err(PollError::Cancelled),
            result = fetch_status(id.to_string()) => result.map_err(|e| {
                warn!(transaction_id = %id, attempt, error = %e, "status fetch failed");
                PollError::Fetch(e)
            })?,
        };

        debug!(
            transaction_id = %id,
            attempt,
            status = %status.status,
            "polled transaction status"
        );

        if !status.is_non_terminal() {
            return Ok(status);
        }

        if attempt >= max_attempts {
            info!(
                transaction_id = %id,
                attempts = attempt,
                status = %status.status,
                "status poll attempts exhausted while non-terminal"
            );
            return Ok(status);
        }

        sleep_or_cancel(interval, &mut cancel).await?;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<&FlowConfig> for PollerConfig {
    fn from(config: &FlowConfig) -> Self {
        Self {
            initial_delay: config.poll_initial_delay,
            interval: config.poll_interval,
            max_attempts: config.poll_max_attempts,
        }
    }
}

/// [`wait_for_terminal`] bound to a transaction backend.
pub struct TransactionStatusPoller {
    backend: Arc<dyn TransactionBackend>,
    config: PollerConfig,
}

impl TransactionStatusPoller {
    pub fn new(backend: Arc<dyn TransactionBackend>, config: PollerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    pub async fn poll(
        &self,
        transaction_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<TransactionStatus, PollError> {
        let backend = Arc::clone(&self.backend);
        wait_for_terminal(
            transaction_id,
            move |id| {
                let backend = Arc::clone(&backend);
                async move { backend.fetch_status(&id).await }
            },
            self.config.initial_delay,
            self.config.interval,
            self.config.max_attempts,
            cancel,
        )
        .await
    }
}

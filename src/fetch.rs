// src/fetch.rs

//! Fetching a node's external dependency (e.g. a data segment) to a local
//! destination, with bounded exponential-backoff retries.
//!
//! Failures come in two classes: [`FetchError::Retryable`] is retried by
//! [`RetryPolicy`], [`FetchError::Permanent`] is returned immediately. The
//! wait between attempts ends early when the run is cancelled.
//! Transport security (TLS) is a concern of concrete fetchers and is not
//! handled here.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dataflow::ExecutionResult;
use crate::operator::{Operator, OperatorConfig, OperatorContext, block_on_worker};

/// Attempts made when nothing is configured.
pub const DEFAULT_RETRY_COUNT: u32 = 3;
/// Wait before the first retry when nothing is configured.
pub const DEFAULT_RETRY_WAIT_MS: u64 = 100;
/// Growth factor of the wait between attempts.
pub const DEFAULT_BACKOFF_SCALE: u32 = 5;

/// Result key used by [`FetchOperator`].
pub const DESTINATION_KEY: &str = "destination";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transient failure; worth another attempt.
    #[error("retryable fetch failure: {0}")]
    Retryable(String),

    /// The source can never be fetched; do not retry.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),

    /// Every attempt failed with a retryable error.
    #[error("fetch failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    /// The run was cancelled before the fetch succeeded.
    #[error("fetch cancelled")]
    Cancelled,
}

/// Something that can copy `source` to a local `destination`.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, source: &str, destination: &Path) -> Result<(), FetchError>;

    /// Like [`fetch`](Self::fetch), but gives up once `cancel` fires.
    fn fetch_until_cancelled(
        &self,
        source: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        self.fetch(source, destination)
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_wait: Duration,
    scale: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(
            DEFAULT_RETRY_COUNT,
            Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
            DEFAULT_BACKOFF_SCALE,
        )
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least 1.
    pub fn exponential(max_attempts: u32, initial_wait: Duration, scale: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_wait,
            scale: scale.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before attempt number `attempt + 1` (0-based `attempt`).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.scale.saturating_pow(attempt);
        self.initial_wait.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn attempt<F>(&self, op: F) -> Result<(), FetchError>
    where
        F: FnMut() -> Result<(), FetchError>,
    {
        self.attempt_until_cancelled(&CancellationToken::new(), op)
    }

    /// [`attempt`](Self::attempt) that stops with [`FetchError::Cancelled`]
    /// as soon as `cancel` fires, including in the middle of a backoff wait.
    pub fn attempt_until_cancelled<F>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<(), FetchError>
    where
        F: FnMut() -> Result<(), FetchError>,
    {
        let mut last = String::new();

        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            match op() {
                Ok(()) => return Ok(()),
                Err(FetchError::Retryable(msg)) => {
                    warn!(attempt = attempt + 1, max = self.max_attempts, error = %msg, "fetch attempt failed; might retry");
                    last = msg;
                    if attempt + 1 < self.max_attempts {
                        backoff(self.delay_after(attempt), cancel)?;
                    }
                }
                Err(other) => {
                    error!(error = %other, "fetch failed; won't retry");
                    return Err(other);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}

/// Wait `delay`, or less if `cancel` fires first.
fn backoff(delay: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    let finished = block_on_worker(async {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    })
    .map_err(|e| FetchError::Permanent(format!("cannot wait between attempts: {e:#}")))?;

    if finished {
        Ok(())
    } else {
        info!("fetch cancelled during backoff");
        Err(FetchError::Cancelled)
    }
}

/// Copies from the local filesystem. Accepts plain paths and `file://` URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileFetcher;

impl LocalFileFetcher {
    fn source_path(source: &str) -> PathBuf {
        PathBuf::from(source.strip_prefix("file://").unwrap_or(source))
    }
}

impl Fetcher for LocalFileFetcher {
    fn fetch(&self, source: &str, destination: &Path) -> Result<(), FetchError> {
        let path = Self::source_path(source);
        debug!(source = %path.display(), destination = %destination.display(), "copying file");

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    FetchError::Permanent(format!("creating {}: {e}", parent.display()))
                })?;
            }
        }

        match fs::copy(&path, destination) {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                Err(FetchError::Permanent(format!("{}: {e}", path.display())))
            }
            Err(e) => Err(FetchError::Retryable(format!("{}: {e}", path.display()))),
        }
    }
}

/// Wraps a fetcher with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    fn fetch(&self, source: &str, destination: &Path) -> Result<(), FetchError> {
        self.policy
            .attempt(|| self.inner.fetch(source, destination))
    }

    fn fetch_until_cancelled(
        &self,
        source: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        self.policy.attempt_until_cancelled(cancel, || {
            self.inner.fetch_until_cancelled(source, destination, cancel)
        })
    }
}

/// Operator that fetches `params.source` into `params.destination`.
///
/// Optional `retry_count` and `retry_wait_ms` parameters tune the backoff.
/// The result is the destination path under [`DESTINATION_KEY`].
#[derive(Default)]
pub struct FetchOperator {
    source: String,
    destination: PathBuf,
    fetcher: Option<Box<dyn Fetcher>>,
}

impl FetchOperator {
    /// Use a custom fetcher instead of the local-file one.
    pub fn with_fetcher(fetcher: impl Fetcher + 'static) -> Self {
        Self {
            fetcher: Some(Box::new(fetcher)),
            ..Self::default()
        }
    }
}

impl Operator for FetchOperator {
    fn initialize(&mut self, config: &OperatorConfig) -> anyhow::Result<()> {
        let node = &config.node;
        self.source = config
            .param_str("source")
            .ok_or_else(|| anyhow!("node '{node}': `fetch` operator needs a `source` parameter"))?
            .to_string();
        self.destination = config
            .param_str("destination")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("node '{node}': `fetch` operator needs a `destination` parameter"))?;

        if self.fetcher.is_none() {
            let retry_count = config
                .param_u64("retry_count")
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(DEFAULT_RETRY_COUNT);
            let retry_wait = config
                .param_u64("retry_wait_ms")
                .unwrap_or(DEFAULT_RETRY_WAIT_MS);
            let policy = RetryPolicy::exponential(
                retry_count,
                Duration::from_millis(retry_wait),
                DEFAULT_BACKOFF_SCALE,
            );
            self.fetcher = Some(Box::new(RetryingFetcher::new(LocalFileFetcher, policy)));
        }
        Ok(())
    }

    fn run(&self, ctx: &OperatorContext) -> anyhow::Result<ExecutionResult> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| anyhow!("node '{}': fetch operator was not initialized", ctx.identifier()))?;

        fetcher.fetch_until_cancelled(&self.source, &self.destination, ctx.cancellation_token())?;

        Ok(ExecutionResult::new(
            DESTINATION_KEY,
            self.destination.display().to_string(),
        ))
    }
}

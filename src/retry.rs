//! Retrying directory initialization with exponential backoff.

use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{FsPermission, RetryConfig, RetryStrategy};
use crate::emit;
use crate::error::StorageError;
use crate::metrics::events::DirCreateRetried;
use crate::storage::StorageService;

/// Compute the sequence of retry delays allowed by the policy.
///
/// Delays accumulate until the next one would exceed the total budget, so
/// the schedule length bounds the number of retries. A zero delay never
/// consumes any budget; the schedule stops instead of spinning, so a zero
/// interval (or a zero multiplier under the exponential strategy) yields a
/// finite schedule.
pub fn backoff_schedule(config: &RetryConfig) -> Vec<Duration> {
    let mut schedule = Vec::new();
    let mut delay = config.interval();
    let mut elapsed = Duration::ZERO;

    while !delay.is_zero() && elapsed + delay <= config.timeout() {
        schedule.push(delay);
        elapsed += delay;
        if config.strategy == RetryStrategy::Exponential {
            delay *= config.multiplier;
        }
    }
    schedule
}

/// Ensure a directory exists, retrying transient failures per policy.
///
/// With retry disabled this is a single attempt. After exhausting the
/// budget the last failure is surfaced as a terminal error.
pub async fn ensure_dirs_with_retry(
    storage: &dyn StorageService,
    path: &Path,
    perm: FsPermission,
    retry: &RetryConfig,
) -> Result<(), StorageError> {
    let mut last = match storage.ensure_dirs(path, perm).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !retry.enabled {
        return Err(last);
    }

    let mut attempts: u32 = 1;
    for delay in backoff_schedule(retry) {
        warn!(
            path = %path.display(),
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %last,
            "Directory creation failed, retrying"
        );
        emit!(DirCreateRetried { attempt: attempts });
        tokio::time::sleep(delay).await;

        attempts += 1;
        match storage.ensure_dirs(path, perm).await {
            Ok(()) => {
                info!(path = %path.display(), attempts, "Directory created after retry");
                return Ok(());
            }
            Err(e) => last = e,
        }
    }

    Err(StorageError::RetryExhausted {
        attempts,
        source: Box::new(last),
    })
}

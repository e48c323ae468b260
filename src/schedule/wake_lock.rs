//! Exclusive, bounded hold over one wake's work.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WakeLockError {
  #[error("timed out after {0:?} waiting for wake lock")]
  Timeout(Duration),
  #[error("wake lock closed")]
  Closed,
}

/// Only one wake body runs at a time; each may hold the lock for at most
/// `max_hold`.
///
/// The scheduler task is the only owner and runs wakes one after another,
/// so the lock bounds how long a wake may take. The acquire timeout only
/// comes into play for a clone handed to a second owner.
#[derive(Clone)]
pub struct WakeLock {
  permits: Arc<Semaphore>,
  acquire_timeout: Duration,
  max_hold: Duration,
  tag: &'static str,
}

impl WakeLock {
  pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
  pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(10);

  pub fn new(tag: &'static str, acquire_timeout: Duration, max_hold: Duration) -> Self {
    Self {
      permits: Arc::new(Semaphore::new(1)),
      acquire_timeout,
      max_hold,
      tag,
    }
  }

  pub fn max_hold(&self) -> Duration {
    self.max_hold
  }

  pub async fn acquire(&self) -> Result<WakeGuard, WakeLockError> {
    let permit = tokio::time::timeout(self.acquire_timeout, Arc::clone(&self.permits).acquire_owned())
      .await
      .map_err(|_| WakeLockError::Timeout(self.acquire_timeout))?
      .map_err(|_| WakeLockError::Closed)?;

    Ok(WakeGuard {
      _permit: permit,
      acquired: Instant::now(),
      max_hold: self.max_hold,
      tag: self.tag,
    })
  }
}

/// Releases the wake lock on drop.
pub struct WakeGuard {
  _permit: OwnedSemaphorePermit,
  acquired: Instant,
  max_hold: Duration,
  tag: &'static str,
}

impl Drop for WakeGuard {
  fn drop(&mut self) {
    let held = self.acquired.elapsed();
    if held > self.max_hold {
      warn!(tag = self.tag, ?held, "Wake lock held past its limit");
    }
  }
}

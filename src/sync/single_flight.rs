//! Per-key deduplication of in-flight async work.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

type Flights<T> = Arc<Mutex<HashMap<String, Shared<BoxFuture<'static, T>>>>>;

/// At most one running operation per key; concurrent callers join it.
pub struct SingleFlight<T: Clone> {
  flights: Flights<T>,
}

impl<T: Clone> Clone for SingleFlight<T> {
  fn clone(&self) -> Self {
    Self {
      flights: Arc::clone(&self.flights),
    }
  }
}

impl<T: Clone> Default for SingleFlight<T> {
  fn default() -> Self {
    Self {
      flights: Arc::new(Mutex::new(HashMap::new())),
    }
  }
}

impl<T> SingleFlight<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `make()` under `key`, or join the operation already in flight.
  ///
  /// `make` is only called when no operation for `key` is running. The key
  /// counts as in flight from this call on, even before the returned future
  /// is first polled, and is released once the operation completes.
  pub fn join<F, Fut>(&self, key: &str, make: F) -> Shared<BoxFuture<'static, T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T> + Send + 'static,
  {
    let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = flights.get(key) {
      return existing.clone();
    }

    let flights_ref = Arc::clone(&self.flights);
    let owned_key = key.to_string();
    let work = make();
    let fut = async move {
      let out = work.await;
      flights_ref
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&owned_key);
      out
    }
    .boxed()
    .shared();
    flights.insert(key.to_string(), fut.clone());
    fut
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_callers_share_one_run() {
    let flights: SingleFlight<u32> = SingleFlight::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let make = |calls: Arc<AtomicUsize>| {
      move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        7
      }
    };

    let (a, b) = tokio::join!(
      flights.join("k", make(calls.clone())),
      flights.join("k", make(calls.clone()))
    );

    assert_eq!((a, b), (7, 7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(flights.flights.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_key_is_released_after_completion() {
    let flights: SingleFlight<u32> = SingleFlight::new();

    assert_eq!(flights.join("k", || async { 1 }).await, 1);
    assert_eq!(flights.join("k", || async { 2 }).await, 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_different_keys_run_independently() {
    let flights: SingleFlight<&'static str> = SingleFlight::new();

    let (a, b) = tokio::join!(
      flights.join("a", || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        "a"
      }),
      flights.join("b", || async { "b" })
    );

    assert_eq!((a, b), ("a", "b"));
  }
}

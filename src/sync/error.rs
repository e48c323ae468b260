use chrono::NaiveDate;
use thiserror::Error;

/// Errors the sync controller surfaces to callers.
///
/// Background refresh and prefetch failures never show up here; they are
/// logged and the cached value keeps being served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
  #[error("no cached prayer times for {date} and the network is unavailable")]
  OfflineNoCache { date: NaiveDate },

  #[error("failed to fetch prayer times for {date}: {reason}")]
  BlockingFetchFailed { date: NaiveDate, reason: String },
}

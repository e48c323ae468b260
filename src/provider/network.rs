use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

use super::NetworkStatus;

/// Reachability by opening a TCP connection to the provider host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
  host: String,
  port: u16,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
    Self {
      host: host.into(),
      port,
      timeout,
    }
  }

  /// Probe the host and port `url` points at.
  pub fn for_url(url: &Url, timeout: Duration) -> Self {
    Self::new(
      url.host_str().unwrap_or("localhost"),
      url.port_or_known_default().unwrap_or(443),
      timeout,
    )
  }
}

#[async_trait]
impl NetworkStatus for TcpProbe {
  async fn is_online(&self) -> bool {
    let connect = TcpStream::connect((self.host.as_str(), self.port));
    matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)))
  }
}

/// Fixed reachability, switchable at runtime.
#[derive(Debug)]
pub struct StaticNetwork {
  online: AtomicBool,
}

impl StaticNetwork {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

#[async_trait]
impl NetworkStatus for StaticNetwork {
  async fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

//! Network reachability: current status plus a stream of transitions.

use std::sync::Arc;
use tokio::sync::watch;

/// Reachability as observed by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetStatus {
  Online,
  Offline,
}

impl NetStatus {
  pub fn is_online(self) -> bool {
    matches!(self, NetStatus::Online)
  }
}

/// Connectivity source the sync layer subscribes to.
///
/// Platform glue reports reachability through [`set_status`]; repeated
/// reports of the same status are dropped, so subscribers see exactly one
/// event per transition.
///
/// [`set_status`]: ConnectivityMonitor::set_status
#[derive(Clone)]
pub struct ConnectivityMonitor {
  tx: Arc<watch::Sender<NetStatus>>,
}

impl ConnectivityMonitor {
  pub fn new(initial: NetStatus) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx: Arc::new(tx) }
  }

  pub fn status(&self) -> NetStatus {
    *self.tx.borrow()
  }

  /// Report the current reachability. Returns whether a transition was
  /// published.
  pub fn set_status(&self, status: NetStatus) -> bool {
    let changed = self.tx.send_if_modified(|current| {
      if *current == status {
        false
      } else {
        *current = status;
        true
      }
    });

    if changed {
      tracing::info!("connectivity changed to {:?}", status);
    }
    changed
  }

  pub fn set_online(&self) -> bool {
    self.set_status(NetStatus::Online)
  }

  pub fn set_offline(&self) -> bool {
    self.set_status(NetStatus::Offline)
  }

  /// Subscribe to status events. The current status is delivered on the
  /// first poll, so consumers never block waiting for the first natural
  /// transition. Dropping the stream unsubscribes.
  pub fn subscribe(&self) -> ConnectivityEvents {
    let mut rx = self.tx.subscribe();
    rx.mark_changed();
    ConnectivityEvents { rx }
  }
}

/// Stream of connectivity statuses for one subscriber.
pub struct ConnectivityEvents {
  rx: watch::Receiver<NetStatus>,
}

impl ConnectivityEvents {
  /// Next status: the current one on the first call, then one per
  /// transition. Returns None once the monitor is gone.
  pub async fn next(&mut self) -> Option<NetStatus> {
    self.rx.changed().await.ok()?;
    Some(*self.rx.borrow_and_update())
  }

  pub fn current(&self) -> NetStatus {
    *self.rx.borrow()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::time::timeout;

  #[tokio::test]
  async fn subscription_delivers_current_status_immediately() {
    let monitor = ConnectivityMonitor::new(NetStatus::Offline);
    let mut events = monitor.subscribe();

    assert_eq!(events.next().await, Some(NetStatus::Offline));
  }

  #[tokio::test(start_paused = true)]
  async fn repeated_status_reports_emit_no_event() {
    let monitor = ConnectivityMonitor::new(NetStatus::Online);
    let mut events = monitor.subscribe();
    assert_eq!(events.next().await, Some(NetStatus::Online));

    // Polling the same status again is not a transition
    assert!(!monitor.set_online());
    let pending = timeout(Duration::from_millis(50), events.next()).await;
    assert!(pending.is_err());
  }

  #[tokio::test]
  async fn transitions_arrive_in_order() {
    let monitor = ConnectivityMonitor::new(NetStatus::Online);
    let mut events = monitor.subscribe();
    assert_eq!(events.next().await, Some(NetStatus::Online));

    assert!(monitor.set_offline());
    assert_eq!(events.next().await, Some(NetStatus::Offline));

    assert!(monitor.set_online());
    assert_eq!(events.next().await, Some(NetStatus::Online));
  }

  #[tokio::test]
  async fn stream_ends_when_monitor_is_dropped() {
    let monitor = ConnectivityMonitor::new(NetStatus::Online);
    let mut events = monitor.subscribe();
    assert_eq!(events.next().await, Some(NetStatus::Online));

    drop(monitor);
    assert_eq!(events.next().await, None);
  }
}

//! Sync reconciler: replays locally-queued mutations once connectivity allows.
//!
//! Each trigger drains everything outstanding - there is no backoff and no
//! dead-letter path. A record that fails stays queued for the next trigger;
//! a record the server accepts is marked synced and removed.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{ApiClient, Submission};
use crate::store::{CartEntry, OfflineStore};

/// Network seam for the reconciler. Implemented by [`ApiClient`]; tests
/// substitute a mock.
pub trait SyncTransport: Send + Sync {
  fn submit_order(
    &self,
    payload: &serde_json::Value,
  ) -> impl Future<Output = Result<Submission>> + Send;

  fn sync_cart(&self, items: &[CartEntry]) -> impl Future<Output = Result<Submission>> + Send;
}

impl SyncTransport for ApiClient {
  fn submit_order(
    &self,
    payload: &serde_json::Value,
  ) -> impl Future<Output = Result<Submission>> + Send {
    ApiClient::submit_order(self, payload)
  }

  fn sync_cart(&self, items: &[CartEntry]) -> impl Future<Output = Result<Submission>> + Send {
    ApiClient::sync_cart(self, items)
  }
}

/// What one reconciliation pass accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Orders accepted by the server and removed from the queue.
  pub orders_synced: usize,
  /// Orders that failed and stay queued for the next trigger.
  pub orders_failed: usize,
  /// Whether the cart snapshot was pushed and cleared.
  pub cart_synced: bool,
  /// Number of cart lines in the attempted batch (0 when the cart was empty).
  pub cart_items: usize,
  /// The session is gone; the user has to log in before the rest can sync.
  pub needs_login: bool,
}

impl SyncReport {
  /// True when the pass had nothing to do.
  pub fn is_empty(&self) -> bool {
    self.orders_synced == 0 && self.orders_failed == 0 && self.cart_items == 0 && !self.needs_login
  }

  /// Human-readable summary, one line per outcome.
  pub fn lines(&self) -> Vec<String> {
    let mut lines = Vec::new();
    if self.orders_synced > 0 {
      lines.push(format!("{} queued order(s) submitted", self.orders_synced));
    }
    if self.orders_failed > 0 {
      lines.push(format!(
        "{} order(s) failed to sync, will retry",
        self.orders_failed
      ));
    }
    if self.cart_synced {
      lines.push(format!("cart snapshot synced ({} item(s))", self.cart_items));
    } else if self.cart_items > 0 {
      lines.push(format!(
        "cart snapshot ({} item(s)) failed to sync, will retry",
        self.cart_items
      ));
    }
    if self.needs_login {
      lines.push("session expired - log in at the storefront to finish syncing".to_string());
    }
    lines
  }
}

/// Drains the durable local store against the network.
pub struct Reconciler<T: SyncTransport> {
  store: Arc<OfflineStore>,
  transport: T,
}

impl<T: SyncTransport> Reconciler<T> {
  pub fn new(store: Arc<OfflineStore>, transport: T) -> Self {
    Self { store, transport }
  }

  /// One reconciliation pass: pending orders oldest-first, then the cart
  /// snapshot as a single batch.
  ///
  /// Individual order failures do not block subsequent orders; the pass makes
  /// whatever partial progress it can.
  pub async fn drain(&self) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for order in self.store.pending_orders()? {
      match self.transport.submit_order(&order.payload).await {
        Ok(Submission::Accepted) => {
          self.store.mark_order_synced(order.id)?;
          self.store.remove_order(order.id)?;
          report.orders_synced += 1;
        }
        Ok(Submission::LoginRequired) => {
          // Session is gone; nothing else will succeed either
          report.needs_login = true;
          break;
        }
        Err(e) => {
          warn!(order_id = order.id, "order replay failed, will retry: {}", e);
          report.orders_failed += 1;
        }
      }
    }

    if !report.needs_login {
      let entries = self.store.cart_entries()?;
      if !entries.is_empty() {
        report.cart_items = entries.len();
        match self.transport.sync_cart(&entries).await {
          Ok(Submission::Accepted) => {
            self.store.clear_cart()?;
            report.cart_synced = true;
          }
          Ok(Submission::LoginRequired) => {
            report.needs_login = true;
          }
          Err(e) => {
            warn!("cart sync failed, snapshot left in place: {}", e);
          }
        }
      }
    }

    if !report.is_empty() {
      info!(
        orders_synced = report.orders_synced,
        orders_failed = report.orders_failed,
        cart_synced = report.cart_synced,
        "reconciliation pass finished"
      );
    }

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  /// Transport double: behavior is chosen per payload, calls are counted.
  #[derive(Default)]
  struct MockTransport {
    order_calls: AtomicU32,
    cart_calls: AtomicU32,
    auth_expired: bool,
    cart_fails: bool,
  }

  impl MockTransport {
    fn order_calls(&self) -> u32 {
      self.order_calls.load(Ordering::SeqCst)
    }

    fn cart_calls(&self) -> u32 {
      self.cart_calls.load(Ordering::SeqCst)
    }
  }

  impl SyncTransport for MockTransport {
    fn submit_order(
      &self,
      payload: &serde_json::Value,
    ) -> impl Future<Output = Result<Submission>> + Send {
      self.order_calls.fetch_add(1, Ordering::SeqCst);
      let outcome = if self.auth_expired {
        Ok(Submission::LoginRequired)
      } else if payload.get("fail").is_some() {
        Err(color_eyre::eyre::eyre!("connection refused"))
      } else {
        Ok(Submission::Accepted)
      };
      async move { outcome }
    }

    fn sync_cart(&self, _items: &[CartEntry]) -> impl Future<Output = Result<Submission>> + Send {
      self.cart_calls.fetch_add(1, Ordering::SeqCst);
      let outcome = if self.cart_fails {
        Err(color_eyre::eyre::eyre!("connection refused"))
      } else {
        Ok(Submission::Accepted)
      };
      async move { outcome }
    }
  }

  fn store_with_orders(payloads: &[serde_json::Value]) -> Arc<OfflineStore> {
    let store = Arc::new(OfflineStore::open_in_memory().unwrap());
    for p in payloads {
      store.queue_order(p).unwrap();
    }
    store
  }

  fn cart_line(id: i64, qty: u32) -> CartEntry {
    CartEntry {
      store_product_id: id,
      quantity: qty,
      metadata: None,
    }
  }

  #[tokio::test]
  async fn test_drain_submits_orders_and_removes_them() {
    let store = store_with_orders(&[json!({"n": 1}), json!({"n": 2})]);
    let reconciler = Reconciler::new(Arc::clone(&store), MockTransport::default());

    let report = reconciler.drain().await.unwrap();

    assert_eq!(report.orders_synced, 2);
    assert_eq!(report.orders_failed, 0);
    assert_eq!(store.pending_order_count().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_second_drain_performs_no_network_calls() {
    let store = store_with_orders(&[json!({"n": 1})]);
    let reconciler = Reconciler::new(Arc::clone(&store), MockTransport::default());

    reconciler.drain().await.unwrap();
    assert_eq!(store.pending_order_count().unwrap(), 0);

    let report = reconciler.drain().await.unwrap();
    assert!(report.is_empty());
    // One call from the first pass, none from the second
    assert_eq!(reconciler.transport.order_calls(), 1);
    assert_eq!(reconciler.transport.cart_calls(), 0);
  }

  #[tokio::test]
  async fn test_order_failure_does_not_block_the_rest() {
    let store = store_with_orders(&[json!({"fail": true}), json!({"n": 2})]);
    let reconciler = Reconciler::new(Arc::clone(&store), MockTransport::default());

    let report = reconciler.drain().await.unwrap();

    assert_eq!(report.orders_synced, 1);
    assert_eq!(report.orders_failed, 1);
    // The failed order stays queued for the next trigger
    let remaining = store.pending_orders().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payload, json!({"fail": true}));
  }

  #[tokio::test]
  async fn test_cart_batch_is_cleared_on_success() {
    let store = store_with_orders(&[]);
    store
      .replace_cart(&[cart_line(7, 2), cart_line(9, 1)])
      .unwrap();
    let reconciler = Reconciler::new(Arc::clone(&store), MockTransport::default());

    let report = reconciler.drain().await.unwrap();

    assert!(report.cart_synced);
    assert_eq!(report.cart_items, 2);
    assert_eq!(reconciler.transport.cart_calls(), 1);
    assert!(store.cart_entries().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cart_failure_leaves_snapshot_untouched() {
    let store = store_with_orders(&[]);
    store.replace_cart(&[cart_line(7, 2)]).unwrap();
    let reconciler = Reconciler::new(
      Arc::clone(&store),
      MockTransport {
        cart_fails: true,
        ..Default::default()
      },
    );

    let report = reconciler.drain().await.unwrap();

    assert!(!report.cart_synced);
    assert_eq!(store.cart_entries().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_auth_failure_halts_the_pass() {
    let store = store_with_orders(&[json!({"n": 1}), json!({"n": 2})]);
    store.replace_cart(&[cart_line(7, 2)]).unwrap();
    let reconciler = Reconciler::new(
      Arc::clone(&store),
      MockTransport {
        auth_expired: true,
        ..Default::default()
      },
    );

    let report = reconciler.drain().await.unwrap();

    assert!(report.needs_login);
    assert_eq!(report.orders_synced, 0);
    // Only the first order was attempted, the cart not at all
    assert_eq!(reconciler.transport.order_calls(), 1);
    assert_eq!(reconciler.transport.cart_calls(), 0);
    assert_eq!(store.pending_order_count().unwrap(), 2);
  }
}

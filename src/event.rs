//! Application events and the connectivity probe.
//!
//! Browsers hand a service worker online/offline signals for free; a CLI has
//! to make its own. The probe task polls a cheap storefront endpoint and
//! emits edge events into an mpsc channel, plus a periodic background sync
//! trigger while the connection holds.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::push::PushPayload;

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Connectivity restored (or confirmed at startup)
  Online,
  /// Connectivity lost (or absent at startup)
  Offline,
  /// Periodic background sync trigger
  SyncRequested,
  /// An incoming push-notification payload
  Push(PushPayload),
}

/// Event handler that produces events from the connectivity probe.
///
/// Other producers (push payloads, manual sync triggers) feed the same
/// channel through [`EventHandler::sender`].
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
  tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler {
  /// Spawn the probe loop. `probe` answers "is the storefront reachable
  /// right now"; edges become `Online`/`Offline` events, and every
  /// `background_sync` of uninterrupted connectivity emits `SyncRequested`.
  pub fn new<P, Fut>(probe: P, probe_interval: Duration, background_sync: Duration) -> Self
  where
    P: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    let probe_tx = tx.clone();
    tokio::spawn(async move {
      let mut online: Option<bool> = None;
      let mut since_sync = Duration::ZERO;

      loop {
        let now_online = probe().await;

        if online != Some(now_online) {
          online = Some(now_online);
          since_sync = Duration::ZERO;
          let event = if now_online {
            Event::Online
          } else {
            Event::Offline
          };
          if probe_tx.send(event).is_err() {
            break;
          }
        } else if now_online {
          since_sync += probe_interval;
          if since_sync >= background_sync {
            since_sync = Duration::ZERO;
            if probe_tx.send(Event::SyncRequested).is_err() {
              break;
            }
          }
        }

        tokio::time::sleep(probe_interval).await;
      }
    });

    Self { rx, tx }
  }

  /// A sender for injecting events from other producers.
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

//! Page-level controller: connectivity state, the offline indicator, and
//! event dispatch.
//!
//! Constructed once per process with its dependencies injected; there is no
//! global state. Every event produces a deterministic state transition
//! reported as an [`Effect`], which keeps the dispatch logic testable without
//! a live connection.

use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::event::{Event, EventHandler};
use crate::push::{resolve_navigation, NavigationAction};
use crate::store::OfflineStore;
use crate::sync::{Reconciler, SyncReport, SyncTransport};

/// The deterministic result of dispatching one event.
#[derive(Debug)]
pub enum Effect {
  /// Nothing changed (duplicate connectivity level, for instance).
  None,
  /// Connectivity lost: the offline indicator is now visible.
  WentOffline,
  /// Connectivity restored: indicator removed, reconciliation ran.
  BackOnline(SyncReport),
  /// A background trigger ran a reconciliation pass.
  SyncCompleted(SyncReport),
  /// A push payload resolved to a navigation intent.
  Navigation(NavigationAction),
}

pub struct Controller<T: SyncTransport> {
  store: Arc<OfflineStore>,
  reconciler: Reconciler<T>,
  /// None until the first connectivity event arrives.
  online: Option<bool>,
  /// Paths of contexts currently open, oldest first.
  open_contexts: Vec<String>,
}

impl<T: SyncTransport> Controller<T> {
  pub fn new(store: Arc<OfflineStore>, reconciler: Reconciler<T>) -> Self {
    Self {
      store,
      reconciler,
      online: None,
      open_contexts: Vec::new(),
    }
  }

  /// Whether the fixed-position offline indicator should be visible.
  pub fn indicator_visible(&self) -> bool {
    self.online == Some(false)
  }

  /// Record a context (page) as open, for push-navigation focusing.
  pub fn register_context(&mut self, path: impl Into<String>) {
    self.open_contexts.push(path.into());
  }

  pub fn store(&self) -> &OfflineStore {
    &self.store
  }

  /// Apply one event. Each arm is a deterministic state transition.
  pub async fn dispatch(&mut self, event: Event) -> Result<Effect> {
    match event {
      Event::Offline => {
        if self.online == Some(false) {
          return Ok(Effect::None);
        }
        self.online = Some(false);
        info!("connectivity lost, showing offline indicator");
        Ok(Effect::WentOffline)
      }
      Event::Online => {
        if self.online == Some(true) {
          return Ok(Effect::None);
        }
        self.online = Some(true);
        info!("connectivity restored, draining pending writes");
        let report = self.reconciler.drain().await?;
        Ok(Effect::BackOnline(report))
      }
      Event::SyncRequested => {
        let report = self.reconciler.drain().await?;
        Ok(Effect::SyncCompleted(report))
      }
      Event::Push(payload) => {
        let target = payload.navigation_target();
        let action = resolve_navigation(&self.open_contexts, &target);
        if let NavigationAction::Open(url) = &action {
          self.open_contexts.push(url.clone());
        }
        Ok(Effect::Navigation(action))
      }
    }
  }

  /// Event loop for `freshsync watch`: dispatch until the channel closes,
  /// narrating transitions on stdout.
  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    while let Some(event) = events.next().await {
      match self.dispatch(event).await? {
        Effect::None => {}
        Effect::WentOffline => {
          println!("offline - changes are recorded locally and sync on reconnect");
        }
        Effect::BackOnline(report) => {
          println!("back online");
          print_report(&report);
        }
        Effect::SyncCompleted(report) => {
          if !report.is_empty() {
            print_report(&report);
          }
        }
        Effect::Navigation(NavigationAction::Focus(url)) => {
          println!("focus existing page: {}", url);
        }
        Effect::Navigation(NavigationAction::Open(url)) => {
          println!("open page: {}", url);
        }
      }
    }
    Ok(())
  }
}

fn print_report(report: &SyncReport) {
  for line in report.lines() {
    println!("  {}", line);
  }
}

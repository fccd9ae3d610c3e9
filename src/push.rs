//! Push payload handling: map a notification to a navigation intent.

use serde::Deserialize;

/// A push-notification payload, discriminated by its `type` field.
///
/// Unrecognized types deserialize to `Unknown` and navigate home.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushPayload {
  OrderStatus {
    order_number: String,
  },
  DeliveryUpdate {
    order_number: String,
  },
  Promotion {
    #[serde(default)]
    url: Option<String>,
  },
  StockAlert {
    product_slug: String,
  },
  #[serde(other)]
  Unknown,
}

impl PushPayload {
  /// The page this notification should land the user on.
  pub fn navigation_target(&self) -> String {
    match self {
      PushPayload::OrderStatus { order_number } => format!("/orders/{}/", order_number),
      PushPayload::DeliveryUpdate { order_number } => format!("/orders/{}/track/", order_number),
      PushPayload::Promotion { url } => url.clone().unwrap_or_else(|| "/".to_string()),
      PushPayload::StockAlert { product_slug } => format!("/catalog/product/{}/", product_slug),
      PushPayload::Unknown => "/".to_string(),
    }
  }
}

/// What to do with the navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationAction {
  /// An existing context already shows the target; bring it to the front.
  Focus(String),
  /// No context shows the target; open a new one.
  Open(String),
}

/// Prefer focusing a context already showing the target over opening a new
/// one.
pub fn resolve_navigation(open_contexts: &[String], target: &str) -> NavigationAction {
  let wanted = normalize(target);
  for context in open_contexts {
    if normalize(context) == wanted {
      return NavigationAction::Focus(context.clone());
    }
  }
  NavigationAction::Open(target.to_string())
}

fn normalize(path: &str) -> &str {
  path.trim_end_matches('/')
}

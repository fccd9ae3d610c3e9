//! Domain types for storefront API results.

/// Result of replaying a queued mutation against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
  /// The server accepted the payload.
  Accepted,
  /// 401/403: the session is gone. Surfaced to the caller as a
  /// redirect-to-login signal, never retried within the pass.
  LoginRequired,
}

/// Result of toggling a product on the wishlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishlistOutcome {
  Added,
  Removed,
  LoginRequired,
}

/// A search autocomplete suggestion.
#[derive(Debug, Clone)]
pub struct Suggestion {
  pub name: String,
  pub category: Option<String>,
}

impl From<super::api_types::ApiSuggestion> for Suggestion {
  fn from(api: super::api_types::ApiSuggestion) -> Self {
    Self {
      name: api.name,
      category: api.category,
    }
  }
}

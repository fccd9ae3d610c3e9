//! Serde-deserializable types matching storefront API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ApiCartMutation {
  pub success: bool,
  #[serde(default)]
  pub cart_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSimple {
  pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiWishlistToggle {
  pub success: bool,
  #[serde(default)]
  pub added: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiFilteredHtml {
  pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiSuggestions {
  #[serde(default)]
  pub suggestions: Vec<ApiSuggestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSuggestion {
  pub name: String,
  #[serde(default)]
  pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCsrfToken {
  pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiVapidKey {
  pub public_key: String,
}

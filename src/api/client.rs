//! Storefront API client.
//!
//! Speaks the JSON contracts of the Fresh Meat server. Mutating calls carry
//! the CSRF token header; the token is fetched lazily and cached in memory.
//! Network failures are returned as errors without retry - retrying is the
//! sync reconciler's job, not the client's.

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::{CachedResponse, Method, Request};
use crate::config::Config;
use crate::store::CartEntry;

use super::api_types::{
  ApiCartMutation, ApiCsrfToken, ApiFilteredHtml, ApiSimple, ApiSuggestions, ApiVapidKey,
  ApiWishlistToggle,
};
use super::types::{Submission, Suggestion, WishlistOutcome};

/// HTTP client for the storefront endpoints.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  csrf: Arc<Mutex<Option<String>>>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", config.server.url, e))?;

    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(cookie) = Config::session_cookie() {
      let value = reqwest::header::HeaderValue::from_str(&format!("sessionid={}", cookie))
        .map_err(|e| eyre!("Invalid session cookie: {}", e))?;
      headers.insert(reqwest::header::COOKIE, value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      csrf: Arc::new(Mutex::new(None)),
    })
  }

  /// The storefront origin this client talks to.
  pub fn origin(&self) -> &Url {
    &self.base
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint path {}: {}", path, e))
  }

  fn cached_csrf(&self) -> Option<String> {
    self.csrf.lock().ok().and_then(|guard| guard.clone())
  }

  fn store_csrf(&self, token: &str) {
    if let Ok(mut guard) = self.csrf.lock() {
      *guard = Some(token.to_string());
    }
  }

  /// The CSRF token for mutating calls, fetched lazily and cached.
  async fn csrf_token(&self) -> Result<String> {
    if let Some(token) = self.cached_csrf() {
      return Ok(token);
    }

    let token = self.fetch_csrf().await?;
    self.store_csrf(&token);
    Ok(token)
  }

  async fn fetch_csrf(&self) -> Result<String> {
    let parsed: ApiCsrfToken = self.get_json(self.endpoint("/api/csrf-token/")?).await?;
    Ok(parsed.token)
  }

  /// Connectivity probe: can the storefront be reached right now?
  ///
  /// Doubles as a CSRF refresh on success.
  pub async fn probe(&self) -> bool {
    match self.fetch_csrf().await {
      Ok(token) => {
        self.store_csrf(&token);
        true
      }
      Err(_) => false,
    }
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
    let resp = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?
      .error_for_status()
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    resp
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }

  async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
    let token = self.csrf_token().await?;
    self
      .http
      .post(self.endpoint(path)?)
      .header("X-CSRFToken", token)
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", path, e))
  }

  fn is_auth_failure(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
  }

  // --------------------------------------------------------------------
  // cart
  // --------------------------------------------------------------------

  /// Add a product to the server-side cart. Returns the new cart count when
  /// the server reports one.
  pub async fn add_to_cart(&self, store_product_id: i64, quantity: u32) -> Result<Option<u32>> {
    let resp = self
      .post_json(
        "/orders/cart/add/",
        &json!({ "store_product_id": store_product_id, "quantity": quantity }),
      )
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Cart add failed: {}", e))?;

    let parsed: ApiCartMutation = resp
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse cart response: {}", e))?;

    if !parsed.success {
      return Err(eyre!("Cart add rejected by server"));
    }
    Ok(parsed.cart_count)
  }

  pub async fn update_cart_item(&self, cart_item_id: i64, quantity: u32) -> Result<()> {
    let resp = self
      .post_json(
        "/orders/cart/update/",
        &json!({ "cart_item_id": cart_item_id, "quantity": quantity }),
      )
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Cart update failed: {}", e))?;

    let parsed: ApiSimple = resp
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse cart response: {}", e))?;

    if !parsed.success {
      return Err(eyre!("Cart update rejected by server"));
    }
    Ok(())
  }

  pub async fn remove_cart_item(&self, cart_item_id: i64) -> Result<()> {
    let resp = self
      .post_json("/orders/cart/remove/", &json!({ "cart_item_id": cart_item_id }))
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Cart remove failed: {}", e))?;

    let parsed: ApiSimple = resp
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse cart response: {}", e))?;

    if !parsed.success {
      return Err(eyre!("Cart remove rejected by server"));
    }
    Ok(())
  }

  // --------------------------------------------------------------------
  // wishlist / catalog
  // --------------------------------------------------------------------

  pub async fn toggle_wishlist(&self, store_product_id: i64) -> Result<WishlistOutcome> {
    let resp = self
      .post_json(
        "/accounts/wishlist/toggle/",
        &json!({ "store_product_id": store_product_id }),
      )
      .await?;

    // 403 signals unauthenticated, not a hard error
    if Self::is_auth_failure(resp.status()) {
      return Ok(WishlistOutcome::LoginRequired);
    }

    let resp = resp
      .error_for_status()
      .map_err(|e| eyre!("Wishlist toggle failed: {}", e))?;

    let parsed: ApiWishlistToggle = resp
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse wishlist response: {}", e))?;

    if !parsed.success {
      return Err(eyre!("Wishlist toggle rejected by server"));
    }
    Ok(if parsed.added {
      WishlistOutcome::Added
    } else {
      WishlistOutcome::Removed
    })
  }

  /// Apply catalog filters; returns the rendered product-grid HTML fragment.
  pub async fn apply_filters(&self, filters: &serde_json::Value) -> Result<String> {
    let resp = self
      .post_json("/catalog/api/filters/", filters)
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Filter request failed: {}", e))?;

    let parsed: ApiFilteredHtml = resp
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse filter response: {}", e))?;

    Ok(parsed.html)
  }

  pub async fn search_suggestions(&self, query: &str) -> Result<Vec<Suggestion>> {
    let mut url = self.endpoint("/catalog/api/search-suggestions/")?;
    url.query_pairs_mut().append_pair("q", query);

    let parsed: ApiSuggestions = self.get_json(url).await?;
    Ok(parsed.suggestions.into_iter().map(Suggestion::from).collect())
  }

  // --------------------------------------------------------------------
  // sync replay
  // --------------------------------------------------------------------

  /// Replay a queued order payload.
  pub async fn submit_order(&self, payload: &serde_json::Value) -> Result<Submission> {
    let resp = self.post_json("/api/orders/", payload).await?;

    if Self::is_auth_failure(resp.status()) {
      return Ok(Submission::LoginRequired);
    }

    resp
      .error_for_status()
      .map_err(|e| eyre!("Order replay failed: {}", e))?;

    Ok(Submission::Accepted)
  }

  /// Push the full cart snapshot in one batch.
  pub async fn sync_cart(&self, items: &[CartEntry]) -> Result<Submission> {
    let resp = self
      .post_json("/api/cart/sync/", &json!({ "items": items }))
      .await?;

    if Self::is_auth_failure(resp.status()) {
      return Ok(Submission::LoginRequired);
    }

    resp
      .error_for_status()
      .map_err(|e| eyre!("Cart sync failed: {}", e))?;

    Ok(Submission::Accepted)
  }

  // --------------------------------------------------------------------
  // push subscription
  // --------------------------------------------------------------------

  pub async fn vapid_key(&self) -> Result<String> {
    let parsed: ApiVapidKey = self.get_json(self.endpoint("/api/push/vapid-key/")?).await?;
    Ok(parsed.public_key)
  }

  pub async fn subscribe_push(&self, subscription: &serde_json::Value) -> Result<()> {
    self
      .post_json("/api/push/subscribe/", &json!({ "subscription": subscription }))
      .await?
      .error_for_status()
      .map_err(|e| eyre!("Push subscribe failed: {}", e))?;
    Ok(())
  }

  // --------------------------------------------------------------------
  // raw fetch, for the cache strategies
  // --------------------------------------------------------------------

  /// Perform one request and collect the complete response.
  ///
  /// This is the network leg the strategy executors race against the cache.
  pub async fn fetch_raw(&self, request: Request) -> Result<CachedResponse> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.http.request(method, request.url.clone());
    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }

    let resp = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let status = resp.status().as_u16();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
      .collect();
    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(CachedResponse::new(status, headers, body))
  }
}

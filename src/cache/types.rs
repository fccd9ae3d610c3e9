//! Request and response types shared by the router, strategies, and storage.

use sha2::{Digest, Sha256};
use url::Url;

/// HTTP method of an intercepted request.
///
/// Only GET requests are ever cached; everything else passes through to the
/// network untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

/// An outbound request as seen by the cache router.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Accept header, when the caller set one. Used to recognize navigations.
  pub accept: Option<String>,
}

impl Request {
  /// A plain GET request with no Accept preference.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      accept: None,
    }
  }

  /// A GET request that prefers an HTML document (a navigation).
  pub fn navigation(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      accept: Some("text/html".to_string()),
    }
  }

  /// Whether this request is a page navigation.
  ///
  /// Navigations get the reserved offline page as a last resort instead of a
  /// bare 503.
  pub fn is_navigation(&self) -> bool {
    self
      .accept
      .as_deref()
      .map(|a| a.starts_with("text/html"))
      .unwrap_or(false)
  }

  /// Stable cache key for this request's identity (method + URL).
  ///
  /// SHA256 hash for stable, fixed-length keys.
  pub fn cache_key(&self) -> String {
    let input = format!("{} {}", self.method.as_str(), self.url);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A stored response: status, headers, and opaque body bytes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CachedResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// 2xx status. Only successful responses are ever written to the cache.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Look up a header value, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

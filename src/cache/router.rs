//! Request classification: which strategy fulfils which request.

use url::Url;

use super::types::{Method, Request};

/// Strategy bucket for an intercepted GET request.
///
/// Every path falls into exactly one bucket; `Pages` is the default for
/// anything unmatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
  /// Server-rendered pages. Network-first with the offline page as fallback.
  Pages,
  /// JSON API reads. Network-first.
  Api,
  /// Versioned static assets (css/js/fonts). Cache-first.
  Static,
  /// Product and banner imagery. Cache-first with a placeholder fallback.
  Images,
  /// Catalog listings. Stale-while-revalidate.
  Products,
}

impl RouteClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      RouteClass::Pages => "pages",
      RouteClass::Api => "api",
      RouteClass::Static => "static",
      RouteClass::Images => "images",
      RouteClass::Products => "products",
    }
  }
}

/// Outcome of routing one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
  /// Fulfil through the strategy for this class.
  Handle(RouteClass),
  /// Never intercepted: non-GET or cross-origin. Goes straight to the network.
  PassThrough,
}

/// Classifies outbound requests against the storefront origin.
pub struct Router {
  origin: Url,
}

impl Router {
  pub fn new(origin: Url) -> Self {
    Self { origin }
  }

  /// Route a single request. Pure: no side effects beyond the decision.
  pub fn route(&self, request: &Request) -> RouteDecision {
    if request.method != Method::Get {
      return RouteDecision::PassThrough;
    }
    if !same_origin(&self.origin, &request.url) {
      return RouteDecision::PassThrough;
    }
    RouteDecision::Handle(classify(request.url.path()))
  }
}

fn same_origin(a: &Url, b: &Url) -> bool {
  a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

const STATIC_EXTENSIONS: &[&str] = &["css", "js", "mjs", "map", "woff", "woff2", "ttf", "json"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"];

/// Classify a path into its strategy bucket.
///
/// Precedence is path-prefix specificity: extension and static/media prefixes
/// first, then API paths, then catalog paths, with `Pages` as the default arm.
pub fn classify(path: &str) -> RouteClass {
  let extension = path.rsplit('/').next().and_then(|seg| {
    let (stem, ext) = seg.rsplit_once('.')?;
    if stem.is_empty() {
      None
    } else {
      Some(ext.to_ascii_lowercase())
    }
  });

  if let Some(ext) = extension {
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
      return RouteClass::Images;
    }
    if STATIC_EXTENSIONS.contains(&ext.as_str()) {
      return RouteClass::Static;
    }
  }

  if path.starts_with("/static/") {
    return RouteClass::Static;
  }
  if path.starts_with("/media/") {
    return RouteClass::Images;
  }

  // /catalog/api/... and /orders/api/... are API reads, not catalog pages,
  // so the api check runs before the products prefixes.
  if path.starts_with("/api/") || path.contains("/api/") {
    return RouteClass::Api;
  }

  if path.starts_with("/catalog/") || path.starts_with("/stores/") || path.starts_with("/products/") {
    return RouteClass::Products;
  }

  RouteClass::Pages
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::types::Request;

  fn router() -> Router {
    Router::new(Url::parse("https://shop.example").unwrap())
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_static_assets() {
    assert_eq!(classify("/static/css/main.css"), RouteClass::Static);
    assert_eq!(classify("/static/js/cart.js"), RouteClass::Static);
    assert_eq!(classify("/static/fonts/inter.woff2"), RouteClass::Static);
  }

  #[test]
  fn test_images() {
    assert_eq!(classify("/media/products/ribeye.jpg"), RouteClass::Images);
    assert_eq!(classify("/static/img/logo.svg"), RouteClass::Images);
    assert_eq!(classify("/favicon.ico"), RouteClass::Images);
  }

  #[test]
  fn test_products() {
    assert_eq!(classify("/catalog/"), RouteClass::Products);
    assert_eq!(classify("/catalog/categories/"), RouteClass::Products);
    assert_eq!(classify("/stores/fm-01/"), RouteClass::Products);
  }

  #[test]
  fn test_api() {
    assert_eq!(classify("/api/csrf-token/"), RouteClass::Api);
    assert_eq!(classify("/orders/api/delivery-slots/"), RouteClass::Api);
    // API precedence over the /catalog/ prefix
    assert_eq!(classify("/catalog/api/filters/"), RouteClass::Api);
  }

  #[test]
  fn test_pages_default() {
    assert_eq!(classify("/"), RouteClass::Pages);
    assert_eq!(classify("/orders/FM-1042/"), RouteClass::Pages);
    assert_eq!(classify("/accounts/login/"), RouteClass::Pages);
    assert_eq!(classify("/some/unknown/path/"), RouteClass::Pages);
  }

  #[test]
  fn test_extension_beats_products_prefix() {
    assert_eq!(classify("/catalog/export.json"), RouteClass::Static);
    assert_eq!(classify("/catalog/hero.webp"), RouteClass::Images);
  }

  #[test]
  fn test_non_get_passes_through() {
    let mut req = get("https://shop.example/orders/cart/add/");
    req.method = Method::Post;
    assert_eq!(router().route(&req), RouteDecision::PassThrough);
  }

  #[test]
  fn test_cross_origin_passes_through() {
    let req = get("https://cdn.other.example/widget.js");
    assert_eq!(router().route(&req), RouteDecision::PassThrough);
  }

  #[test]
  fn test_same_origin_get_is_handled() {
    let req = get("https://shop.example/catalog/");
    assert_eq!(
      router().route(&req),
      RouteDecision::Handle(RouteClass::Products)
    );
  }
}

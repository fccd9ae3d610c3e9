//! Strategy executors: the four request-fulfilment policies.
//!
//! Each executor is a function from (request, shared cache, fetcher) to a
//! response. The fetcher is injected as a closure so the executors never know
//! about HTTP clients, which also makes them testable without a live server.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::fallback;
use super::router::RouteClass;
use super::storage::ResponseCache;
use super::types::{CachedResponse, Request};

/// Where a fulfilled response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Served from the response cache
  Cache,
  /// Reserved fallback content (offline page, placeholder, 503)
  Fallback,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseSource::Network => "network",
      ResponseSource::Cache => "cache",
      ResponseSource::Fallback => "fallback",
    }
  }
}

/// A fulfilled request: the response plus where it came from.
#[derive(Debug, Clone)]
pub struct Fulfilled {
  pub response: CachedResponse,
  pub source: ResponseSource,
}

impl Fulfilled {
  fn from_network(response: CachedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  fn from_cache(response: CachedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }

  fn fallback(response: CachedResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Fallback,
    }
  }
}

/// Default network race timeout for the network-first strategy.
pub const NETWORK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Executes the strategy for a routed request against the shared response
/// cache.
pub struct StrategyExecutor<C: ResponseCache> {
  cache: Arc<C>,
  network_timeout: Duration,
}

impl<C: ResponseCache + 'static> StrategyExecutor<C> {
  pub fn new(cache: Arc<C>) -> Self {
    Self {
      cache,
      network_timeout: NETWORK_TIMEOUT,
    }
  }

  /// Override the network-first timeout.
  pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
    self.network_timeout = timeout;
    self
  }

  /// Fulfil a classified request through its strategy.
  pub async fn fulfil<F, Fut>(&self, class: RouteClass, request: &Request, fetch: F) -> Fulfilled
  where
    F: FnOnce(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Result<CachedResponse>> + Send + 'static,
  {
    match class {
      RouteClass::Pages | RouteClass::Api => self.network_first(request, fetch).await,
      RouteClass::Static => self.cache_first(request, fetch, false).await,
      RouteClass::Images => self.cache_first(request, fetch, true).await,
      RouteClass::Products => self.stale_while_revalidate(request, fetch).await,
    }
  }

  /// Pass-through: hand the request to the network untouched, no caching.
  ///
  /// Unlike the caching strategies this propagates network errors, since
  /// there is no fallback that could stand in for a failed write.
  pub async fn pass_through<F, Fut>(&self, request: &Request, fetch: F) -> Result<Fulfilled>
  where
    F: FnOnce(Request) -> Fut,
    Fut: Future<Output = Result<CachedResponse>>,
  {
    let response = fetch(request.clone()).await?;
    Ok(Fulfilled::from_network(response))
  }

  /// Network-first: race the network against a fixed timeout.
  ///
  /// 1. Fetch with a timeout; on success, overwrite the cache and return fresh
  /// 2. On failure or timeout, fall back to the cached entry
  /// 3. With no cache, navigations get the offline page, everything else a 503
  ///
  /// A timed-out fetch is abandoned, not aborted: it keeps running in its own
  /// task and may still populate the cache after the fact.
  async fn network_first<F, Fut>(&self, request: &Request, fetch: F) -> Fulfilled
  where
    F: FnOnce(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Result<CachedResponse>> + Send + 'static,
  {
    let handle = self.spawn_fetch(request.clone(), fetch);

    match tokio::time::timeout(self.network_timeout, handle).await {
      Ok(Ok(Ok(response))) => return Fulfilled::from_network(response),
      Ok(Ok(Err(e))) => debug!(url = %request.url, "network-first fetch failed: {}", e),
      Ok(Err(e)) => warn!(url = %request.url, "network-first task aborted: {}", e),
      Err(_) => debug!(url = %request.url, "network-first fetch timed out"),
    }

    if let Some(cached) = self.lookup(request) {
      return Fulfilled::from_cache(cached);
    }

    if request.is_navigation() {
      Fulfilled::fallback(fallback::offline_page())
    } else {
      Fulfilled::fallback(fallback::service_unavailable())
    }
  }

  /// Cache-first: the cached entry wins; otherwise fetch and populate.
  ///
  /// On total failure, images get the reserved placeholder, everything else
  /// a synthesized 503.
  async fn cache_first<F, Fut>(&self, request: &Request, fetch: F, image: bool) -> Fulfilled
  where
    F: FnOnce(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Result<CachedResponse>> + Send + 'static,
  {
    if let Some(cached) = self.lookup(request) {
      return Fulfilled::from_cache(cached);
    }

    match self.spawn_fetch(request.clone(), fetch).await {
      Ok(Ok(response)) => Fulfilled::from_network(response),
      Ok(Err(e)) => {
        debug!(url = %request.url, "cache-first fetch failed: {}", e);
        Fulfilled::fallback(if image {
          fallback::placeholder_image()
        } else {
          fallback::service_unavailable()
        })
      }
      Err(e) => {
        warn!(url = %request.url, "cache-first task aborted: {}", e);
        Fulfilled::fallback(if image {
          fallback::placeholder_image()
        } else {
          fallback::service_unavailable()
        })
      }
    }
  }

  /// Stale-while-revalidate: the cached entry is returned immediately while a
  /// background task refreshes the cache; the caller never sees the refresh.
  ///
  /// With no cached entry the fetch is awaited, with a 503 on failure.
  async fn stale_while_revalidate<F, Fut>(&self, request: &Request, fetch: F) -> Fulfilled
  where
    F: FnOnce(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Result<CachedResponse>> + Send + 'static,
  {
    if let Some(cached) = self.lookup(request) {
      // Refresh in the background; the result is discarded.
      let _refresh = self.spawn_fetch(request.clone(), fetch);
      return Fulfilled::from_cache(cached);
    }

    match self.spawn_fetch(request.clone(), fetch).await {
      Ok(Ok(response)) => Fulfilled::from_network(response),
      _ => Fulfilled::fallback(fallback::service_unavailable()),
    }
  }

  /// Run the fetch and any cache write in a detached task.
  ///
  /// Cache writes live in the executor's own task, so a caller abandoning the
  /// request cannot leave the cache half-written.
  fn spawn_fetch<F, Fut>(&self, request: Request, fetch: F) -> JoinHandle<Result<CachedResponse>>
  where
    F: FnOnce(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Result<CachedResponse>> + Send + 'static,
  {
    let cache = Arc::clone(&self.cache);
    let key = request.cache_key();

    tokio::spawn(async move {
      let response = fetch(request).await?;
      // Only successful GET responses are ever stored
      if response.is_success() {
        if let Err(e) = cache.put(&key, &response) {
          warn!("failed to cache response: {}", e);
        }
      }
      Ok(response)
    })
  }

  /// Cache lookup that degrades to a miss on storage failure.
  fn lookup(&self, request: &Request) -> Option<CachedResponse> {
    match self.cache.get(&request.cache_key()) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(url = %request.url, "cache lookup failed, treating as miss: {}", e);
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteCache;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicU32, Ordering};
  use url::Url;

  fn executor() -> (Arc<SqliteCache>, StrategyExecutor<SqliteCache>) {
    let cache = Arc::new(SqliteCache::open_in_memory("fresh-meat-v1.0.0").unwrap());
    (Arc::clone(&cache), StrategyExecutor::new(cache))
  }

  fn request(path: &str) -> Request {
    Request::get(Url::parse(&format!("https://shop.example{}", path)).unwrap())
  }

  fn response(body: &str) -> CachedResponse {
    CachedResponse::new(
      200,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  fn offline_fetch(
    calls: Arc<AtomicU32>,
  ) -> impl FnOnce(Request) -> std::pin::Pin<Box<dyn Future<Output = Result<CachedResponse>> + Send>>
  {
    move |_req| {
      calls.fetch_add(1, Ordering::SeqCst);
      Box::pin(async { Err(eyre!("connection refused")) })
    }
  }

  #[tokio::test]
  async fn test_cache_first_serves_cached_body_offline() {
    let (cache, exec) = executor();
    let req = request("/static/css/main.css");
    cache.put(&req.cache_key(), &response("body{}")).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let got = exec
      .fulfil(RouteClass::Static, &req, offline_fetch(Arc::clone(&calls)))
      .await;

    assert_eq!(got.source, ResponseSource::Cache);
    assert_eq!(got.response.status, 200);
    assert_eq!(got.response.body, b"body{}");
    // Cached entry wins without touching the network
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_cache_first_miss_offline_returns_503() {
    let (_cache, exec) = executor();
    let req = request("/static/css/missing.css");

    let calls = Arc::new(AtomicU32::new(0));
    let got = exec
      .fulfil(RouteClass::Static, &req, offline_fetch(Arc::clone(&calls)))
      .await;

    assert_eq!(got.source, ResponseSource::Fallback);
    assert_eq!(got.response.status, 503);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_image_miss_offline_returns_placeholder() {
    let (_cache, exec) = executor();
    let req = request("/media/products/ribeye.jpg");

    let got = exec
      .fulfil(
        RouteClass::Images,
        &req,
        offline_fetch(Arc::new(AtomicU32::new(0))),
      )
      .await;

    assert_eq!(got.source, ResponseSource::Fallback);
    assert_eq!(got.response.status, 200);
    assert_eq!(got.response.header("content-type"), Some("image/svg+xml"));
  }

  #[tokio::test]
  async fn test_cache_first_populates_cache_on_miss() {
    let (cache, exec) = executor();
    let req = request("/static/js/cart.js");

    let got = exec
      .fulfil(RouteClass::Static, &req, |_req| async {
        Ok(response("console.log()"))
      })
      .await;

    assert_eq!(got.source, ResponseSource::Network);
    let stored = cache.get(&req.cache_key()).unwrap().unwrap();
    assert_eq!(stored.body, b"console.log()");
  }

  #[tokio::test]
  async fn test_network_first_overwrites_cache() {
    let (cache, exec) = executor();
    let req = request("/orders/");
    cache.put(&req.cache_key(), &response("old page")).unwrap();

    let got = exec
      .fulfil(RouteClass::Pages, &req, |_req| async {
        Ok(response("new page"))
      })
      .await;

    assert_eq!(got.source, ResponseSource::Network);
    assert_eq!(got.response.body, b"new page");

    // Give the detached write a moment to land
    tokio::time::sleep(Duration::from_millis(20)).await;
    let stored = cache.get(&req.cache_key()).unwrap().unwrap();
    assert_eq!(stored.body, b"new page");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_cache() {
    let (cache, exec) = executor();
    let req = request("/orders/");
    cache.put(&req.cache_key(), &response("old page")).unwrap();

    let got = exec
      .fulfil(
        RouteClass::Pages,
        &req,
        offline_fetch(Arc::new(AtomicU32::new(0))),
      )
      .await;

    assert_eq!(got.source, ResponseSource::Cache);
    assert_eq!(got.response.body, b"old page");
  }

  #[tokio::test]
  async fn test_network_first_timeout_falls_back_to_cache() {
    let (cache, exec) = executor();
    let exec = exec.with_network_timeout(Duration::from_millis(30));
    let req = request("/orders/");
    cache.put(&req.cache_key(), &response("old page")).unwrap();

    let got = exec
      .fulfil(RouteClass::Pages, &req, |_req| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(response("too late"))
      })
      .await;

    assert_eq!(got.source, ResponseSource::Cache);
    assert_eq!(got.response.body, b"old page");
  }

  #[tokio::test]
  async fn test_network_first_navigation_gets_offline_page() {
    let (_cache, exec) = executor();
    let req = Request::navigation(Url::parse("https://shop.example/checkout/fm-01/").unwrap());

    let got = exec
      .fulfil(
        RouteClass::Pages,
        &req,
        offline_fetch(Arc::new(AtomicU32::new(0))),
      )
      .await;

    assert_eq!(got.source, ResponseSource::Fallback);
    assert_eq!(got.response.status, 200);
    assert!(String::from_utf8_lossy(&got.response.body).contains("offline"));
  }

  #[tokio::test]
  async fn test_network_first_api_miss_returns_503() {
    let (_cache, exec) = executor();
    let req = request("/api/csrf-token/");

    let got = exec
      .fulfil(
        RouteClass::Api,
        &req,
        offline_fetch(Arc::new(AtomicU32::new(0))),
      )
      .await;

    assert_eq!(got.response.status, 503);
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_serves_stale_then_refreshes() {
    let (cache, exec) = executor();
    let req = request("/catalog/categories/");
    cache.put(&req.cache_key(), &response("stale list")).unwrap();

    let got = exec
      .fulfil(RouteClass::Products, &req, |_req| async {
        // Slow network must not delay the cached response
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(response("fresh list"))
      })
      .await;

    assert_eq!(got.source, ResponseSource::Cache);
    assert_eq!(got.response.body, b"stale list");

    // The background refresh lands after the fetch resolves
    tokio::time::sleep(Duration::from_millis(150)).await;
    let stored = cache.get(&req.cache_key()).unwrap().unwrap();
    assert_eq!(stored.body, b"fresh list");
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_miss_blocks_on_network() {
    let (_cache, exec) = executor();
    let req = request("/catalog/");

    let got = exec
      .fulfil(RouteClass::Products, &req, |_req| async {
        Ok(response("first load"))
      })
      .await;

    assert_eq!(got.source, ResponseSource::Network);
    assert_eq!(got.response.body, b"first load");
  }

  #[tokio::test]
  async fn test_stale_while_revalidate_miss_offline_returns_503() {
    let (_cache, exec) = executor();
    let req = request("/catalog/");

    let got = exec
      .fulfil(
        RouteClass::Products,
        &req,
        offline_fetch(Arc::new(AtomicU32::new(0))),
      )
      .await;

    assert_eq!(got.response.status, 503);
  }

  #[tokio::test]
  async fn test_non_success_responses_are_not_cached() {
    let (cache, exec) = executor();
    let req = request("/static/css/gone.css");

    let got = exec
      .fulfil(RouteClass::Static, &req, |_req| async {
        Ok(CachedResponse::new(404, Vec::new(), b"not found".to_vec()))
      })
      .await;

    // The 404 is returned to the caller but never stored
    assert_eq!(got.response.status, 404);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.get(&req.cache_key()).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_pass_through_does_not_cache() {
    let (cache, exec) = executor();
    let req = request("/healthz");

    let got = exec
      .pass_through(&req, |_req| async { Ok(response("ok")) })
      .await
      .unwrap();

    assert_eq!(got.source, ResponseSource::Network);
    assert!(cache.get(&req.cache_key()).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_abandoned_fetch_still_populates_cache() {
    let (cache, exec) = executor();
    let exec = exec.with_network_timeout(Duration::from_millis(20));
    let req = request("/orders/");

    let got = exec
      .fulfil(RouteClass::Pages, &req, |_req| async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        Ok(response("late arrival"))
      })
      .await;

    // Timed out with no cache entry: synthesized 503
    assert_eq!(got.response.status, 503);

    // The abandoned fetch completes in its own task and writes the cache
    tokio::time::sleep(Duration::from_millis(150)).await;
    let stored = cache.get(&req.cache_key()).unwrap().unwrap();
    assert_eq!(stored.body, b"late arrival");
  }
}

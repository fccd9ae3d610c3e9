//! Reserved fallback content served when neither network nor cache can help.

use super::types::CachedResponse;

/// The reserved offline page, served for failed navigations.
const OFFLINE_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>You're offline - Fresh Meat</title>
  <style>
    body { font-family: system-ui, sans-serif; text-align: center; padding: 4rem 1rem; color: #333; }
    h1 { color: #c0392b; }
  </style>
</head>
<body>
  <h1>You're offline</h1>
  <p>We couldn't reach the store. Your cart and orders are saved locally
  and will sync automatically once you're back online.</p>
</body>
</html>
"#;

/// The reserved placeholder, served for failed image loads.
const PLACEHOLDER_IMAGE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">
  <rect width="200" height="200" fill="#eee"/>
  <text x="100" y="100" text-anchor="middle" dominant-baseline="middle" fill="#999" font-family="sans-serif" font-size="14">image unavailable</text>
</svg>
"##;

pub fn offline_page() -> CachedResponse {
  CachedResponse::new(
    200,
    vec![(
      "content-type".to_string(),
      "text/html; charset=utf-8".to_string(),
    )],
    OFFLINE_PAGE.as_bytes().to_vec(),
  )
}

pub fn placeholder_image() -> CachedResponse {
  CachedResponse::new(
    200,
    vec![("content-type".to_string(), "image/svg+xml".to_string())],
    PLACEHOLDER_IMAGE.as_bytes().to_vec(),
  )
}

/// Synthesized 503 for any otherwise unrecoverable read.
pub fn service_unavailable() -> CachedResponse {
  CachedResponse::new(
    503,
    vec![("content-type".to_string(), "text/plain".to_string())],
    b"Service unavailable".to_vec(),
  )
}

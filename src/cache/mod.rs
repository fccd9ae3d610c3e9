//! Response caching layer for offline-capable reads.
//!
//! This module is the read path of the sync client:
//! - Classifies outbound GET requests into strategy buckets (router)
//! - Fulfils each through one of four policies: network-first, cache-first,
//!   stale-while-revalidate, pass-through (strategy)
//! - Persists responses in named cache generations, replaced wholesale on a
//!   version bump (storage)
//! - Serves reserved fallback content when neither network nor cache can
//!   satisfy a request (fallback)

pub mod fallback;
mod router;
mod storage;
mod strategy;
mod types;

pub use router::{classify, RouteClass, RouteDecision, Router};
pub use storage::{NoopCache, ResponseCache, SqliteCache};
pub use strategy::{Fulfilled, ResponseSource, StrategyExecutor, NETWORK_TIMEOUT};
pub use types::{CachedResponse, Method, Request};

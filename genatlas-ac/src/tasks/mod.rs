//! Asynchronous external-job handling
//!
//! `cache` deduplicates submissions and tracks job lifecycles, `queue` is
//! the injected execution seam (in-process worker pool in production, fake
//! in tests), `providers` adapts the external REST services with bounded
//! polling.

pub mod cache;
pub mod providers;
pub mod queue;

pub use cache::TaskCache;

//! Debounced call dispatch
//!
//! This crate provides:
//! - Value-based call keys (positional + named arguments)
//! - An ordered suppression cache with window-based eviction
//! - A single-worker dispatcher that fires each key at most once per
//!   quiescence window, in submission order, without blocking producers
//! - A clock seam so delay logic runs on tokio's pausable time

pub mod cache;
pub mod clock;
pub mod dispatcher;
pub mod key;
pub mod stats;

// Re-exports
pub use cache::SuppressionCache;
pub use clock::{Clock, TokioClock};
pub use dispatcher::{
    Callee, DebounceConfig, DispatchError, Dispatcher, DispatcherHandle, ShutdownMode, MAX_DELAY,
};
pub use key::{CallKey, KeyValue};
pub use stats::{DispatchStats, StatsSnapshot};

//! Common utilities for integration tests

#![allow(dead_code)]

pub mod cli;
pub mod fake;

use std::time::{Duration, Instant};

// Re-export commonly used items
pub use fake::{bind, volume, FakeRuntime};

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

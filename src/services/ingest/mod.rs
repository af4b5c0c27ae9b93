//! Venue ingesters. Each venue runs as its own supervised background
//! task: connect, subscribe, stream ticks into the shared [`PriceCache`],
//! and on any connection-level error wait a fixed backoff and reconnect.
//! Parse errors on an individual frame are dropped, not a reconnect
//! trigger — one bad message must never tear down the stream.

pub mod binance;
pub mod coinbase;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared by both ingesters: a running flag plus the fixed reconnect delay.
pub struct IngesterHandle {
    running: Arc<AtomicBool>,
}

impl IngesterHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for IngesterHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) async fn backoff_sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

pub(crate) fn is_running(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

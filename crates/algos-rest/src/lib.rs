//! HTTP front end for the algos scheduler.
//!
//! Routes are thin: they parse the request, call the [`Scheduler`] and map
//! [`CoreError`](algos_core::CoreError) kinds to status codes. [`client`]
//! is the matching blocking HTTP client.

pub mod api;
pub mod client;
pub mod error;

use std::time::Duration;

use algos_core::Scheduler;

pub use api::router;
pub use client::{ClientError, RestClient};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

/// Periodically purge finished jobs older than `retention`. Runs until the task is dropped.
pub async fn retention_sweep(scheduler: Scheduler, retention: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = scheduler.sweep(retention).await {
            tracing::warn!("retention sweep failed: {e:#}");
        }
    }
}

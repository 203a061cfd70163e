//! Background work that must not run on the request path.
//!
//! [`BackgroundWorker`] drives any [`BackgroundRunnable`]; the server runs
//! [`CacheMaintenance`] on it to sweep expired exports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::traits::ExportCache;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Periodic job executed by `BackgroundWorker`.
///
/// Implementors define what happens on each tick and how to clean up on
/// shutdown.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// Called once per tick interval.
    async fn on_tick(&mut self);

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// CacheMaintenance
// ---------------------------------------------------------------------------

/// Keeps the export cache tidy: purges expired entries on every tick so
/// fingerprints nobody asks for again do not pile up.
pub struct CacheMaintenance {
    cache: Arc<dyn ExportCache>,
}

impl CacheMaintenance {
    #[must_use]
    pub fn new(cache: Arc<dyn ExportCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl BackgroundRunnable for CacheMaintenance {
    async fn on_tick(&mut self) {
        match self.cache.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "purged expired export cache entries"),
            Err(e) => warn!(error = %e, "export cache purge failed"),
        }
    }

    async fn shutdown(&mut self) {
        let stats = self.cache.stats();
        debug!(
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            "cache maintenance stopped"
        );
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Runs a [`BackgroundRunnable`] on its own tokio task.
///
/// The runnable's `on_tick` fires every `tick`; ticks missed while one runs
/// long are not replayed in a burst. `stop` lets the current tick finish,
/// then calls `shutdown`.
pub struct BackgroundWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawns the worker. The first tick fires one full `tick` after start.
    pub fn start<R: BackgroundRunnable>(mut runnable: R, tick: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut stop_rx => break,
                }
            }

            runnable.shutdown().await;
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stops the worker and waits for `shutdown` to complete. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The task may already have exited on its own.
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "background worker task failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

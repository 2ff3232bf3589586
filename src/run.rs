//! Run orchestration: resolves a `Config` into a URL list, launches a
//! browser pool, and drives the work queue to completion under one
//! `runId`, tracking every run started in this process so the control
//! surface can look one up by id.
//!
//! Grounded on the teacher's `CliRunner` (`cli.rs`): a thin struct wrapping
//! shared services (there `Arc<ScreenshotService>`; here `EventBus` +
//! per-run `BrowserPool`) with one method per unit of work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::artifact::RunSummary;
use crate::browser_pool::BrowserPool;
use crate::config::{Config, EnvOverrides};
use crate::error::Result;
use crate::events::EventBus;
use crate::metrics::Metrics;
use crate::queue::{self, CancelToken};
use crate::sitemap;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `runId`: an ISO-timestamp prefix plus a per-process sequence number, so
/// two runs started within the same millisecond still get distinct ids.
fn new_run_id() -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{timestamp}-{seq}")
}

/// A handle to a run in flight (or finished). Cheap to clone; cancelling it
/// more than once, or after it has already finished, is a no-op.
#[derive(Clone)]
pub struct RunHandle {
    pub run_id: String,
    cancel: CancelToken,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

struct RunEntry {
    handle: RunHandle,
    summary: tokio::sync::watch::Receiver<Option<RunSummary>>,
}

/// Tracks every run started in this process. Spec.md §4.8 requires at most
/// one concurrently *executing* run per process; this type only records
/// what's in flight or finished; the control surface is what enforces the
/// one-at-a-time rule by checking `active_runs()` before calling `start`.
#[derive(Clone)]
pub struct RunManager {
    bus: EventBus,
    env: EnvOverrides,
    runs: Arc<DashMap<String, RunEntry>>,
    metrics: Arc<Metrics>,
}

impl RunManager {
    pub fn new(bus: EventBus, env: EnvOverrides) -> Self {
        Self {
            bus,
            env,
            runs: Arc::new(DashMap::new()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn active_runs(&self) -> usize {
        self.runs
            .iter()
            .filter(|entry| entry.summary.borrow().is_none())
            .count()
    }

    /// Validates `config`, resolves its URL list (sitemap and/or direct
    /// `urls`, then include/exclude filtering and the `maxPages` cap),
    /// launches a dedicated browser pool, and spawns the run in the
    /// background. Returns as soon as the URL list is ready, not when the
    /// run finishes.
    pub async fn start(&self, config: Config) -> Result<RunHandle> {
        config.validate()?;

        let run_id = new_run_id();
        let client = reqwest::Client::new();

        let mut urls = config.urls.clone();
        if let Some(sitemap_url) = &config.sitemap_url {
            urls.extend(sitemap::load_sitemap(&client, sitemap_url).await?);
        }
        let urls = sitemap::filter_urls(
            urls,
            config.include_pattern.as_deref(),
            config.exclude_pattern.as_deref(),
            config.max_pages,
        )?;

        let pool = BrowserPool::new(config.concurrency, &self.env).await?;
        let cancel = CancelToken::new();
        let handle = RunHandle {
            run_id: run_id.clone(),
            cancel: cancel.clone(),
        };

        let (tx, rx) = tokio::sync::watch::channel(None);
        self.runs.insert(
            run_id.clone(),
            RunEntry {
                handle: handle.clone(),
                summary: rx,
            },
        );

        self.metrics.set_active_runs(self.active_runs());

        let bus = self.bus.clone();
        let pool_for_run = pool.clone();
        let run_id_for_task = run_id.clone();
        let metrics = self.metrics.clone();
        let manager = self.clone();
        tokio::spawn(async move {
            let summary = queue::run(run_id_for_task, config, pool_for_run, bus, urls, cancel).await;
            pool.close().await;
            if tx.send(Some(summary)).is_err() {
                warn!("run {run_id} finished after its last summary receiver was dropped");
            }
            metrics.set_active_runs(manager.active_runs());
        });

        Ok(handle)
    }

    pub fn handle(&self, run_id: &str) -> Option<RunHandle> {
        self.runs.get(run_id).map(|entry| entry.handle.clone())
    }

    /// Flips the cancel token of every run still in flight. Used by the
    /// process-wide shutdown handler so a SIGINT/SIGTERM doesn't just kill
    /// the process out from under an in-progress run's partially-written
    /// artifacts; each worker checks its token between URLs and stops
    /// cleanly instead.
    pub fn cancel_all(&self) {
        for entry in self.runs.iter() {
            entry.handle.cancel();
        }
    }

    /// `None` until the run has finished; `Some` with its summary after.
    pub async fn summary(&self, run_id: &str) -> Option<RunSummary> {
        let entry = self.runs.get(run_id)?;
        entry.summary.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_within_the_same_instant() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert!(a.starts_with("run-"));
    }
}

//! Work queue: `concurrency` workers pulling from a shared URL channel,
//! each driving one URL through acquire → rate-limit → navigate → audit
//! chain → persist, with retry/backoff and redirect handling.
//!
//! Generalizes the teacher's `WorkerPool`/`ScreenshotWorker` (a plain
//! mpsc-drain loop) into the full per-URL attempt loop of spec.md §4.4,
//! plus `examples/other_examples/.../audit-batch.rs.rs`'s
//! `run_concurrent_batch` for the semaphore-gated per-URL spawn shape.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::warn;

use crate::artifact::{self, PageArtifact, PageStatus, RunPaths, RunSummary};
use crate::audits::{self, AuditModule};
use crate::browser_pool::BrowserPool;
use crate::config::Config;
use crate::error::AuditError;
use crate::events::{AuditCounts, Event, EventBus, EventKind};
use crate::metrics::Metrics;
use crate::page_context::{HttpObservation, PageContext};
use crate::rate_limiter::RateLimiter;
use crate::retry;

/// Hard per-run timeout regardless of how many URLs remain (spec.md §5).
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Finished,
    Errored,
    Skipped,
    Redirected,
}

#[derive(Debug, Clone)]
pub struct UrlTask {
    pub url: String,
    pub attempt: usize,
    pub state: TaskState,
}

/// A run-wide cancel signal, checked at every suspension point. Cheap to
/// clone; idempotent to cancel more than once.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct RunContext {
    run_id: String,
    config: Config,
    pool: BrowserPool,
    bus: EventBus,
    rate_limiter: RateLimiter,
    paths: RunPaths,
    chain: Vec<Box<dyn AuditModule>>,
    cancel: CancelToken,
    metrics: Arc<Metrics>,
}

/// Runs the full queue over `urls` to completion (or cancellation) and
/// returns the run summary. `concurrency` workers pull from a shared
/// channel fed once up front by this function.
pub async fn run(
    run_id: String,
    config: Config,
    pool: BrowserPool,
    bus: EventBus,
    urls: Vec<String>,
    cancel: CancelToken,
) -> RunSummary {
    let started_at = chrono::Utc::now();
    let paths = RunPaths::new(&config.output_dir, &run_id);
    if let Err(e) = paths.ensure_dirs().await {
        warn!("failed to create run output directories: {e}");
    }

    let chain = audits::build_chain(&config);
    let rate_limiter = RateLimiter::new(config.max_requests_per_second);
    let concurrency = config.concurrency;
    let metrics = Arc::new(Metrics::new());

    let ctx = Arc::new(RunContext {
        run_id: run_id.clone(),
        config,
        pool,
        bus: bus.clone(),
        rate_limiter,
        paths,
        chain,
        cancel,
        metrics,
    });

    bus.publish(Event::new(run_id.clone(), None, EventKind::AuditStarted));

    let (tx, rx) = mpsc::channel::<String>(urls.len().max(1));
    for url in &urls {
        bus.publish(Event::new(
            run_id.clone(),
            Some(url.clone()),
            EventKind::PageQueued,
        ));
        let _ = tx.send(url.clone()).await;
    }
    drop(tx);
    ctx.metrics.set_queue_depth(urls.len());

    let rx = Arc::new(Mutex::new(rx));
    let statuses = Arc::new(Mutex::new(Vec::<PageStatus>::new()));
    let module_scores = Arc::new(Mutex::new(HashMap::<String, Vec<f64>>::new()));

    let run_future = async {
        let mut handles = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let ctx = ctx.clone();
            let rx = rx.clone();
            let statuses = statuses.clone();
            let module_scores = module_scores.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(ctx, rx, statuses, module_scores).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    };

    if tokio::time::timeout(RUN_TIMEOUT, run_future).await.is_err() {
        warn!("run {run_id} hit the {RUN_TIMEOUT:?} hard timeout, cancelling remaining work");
        ctx.cancel.cancel();
    }

    let statuses = statuses.lock().await;
    let module_scores = module_scores.lock().await;
    let summary = RunSummary::build(&run_id, started_at, &statuses[..], &module_scores);

    if let Err(e) = artifact::write_summary(&ctx.paths, &summary).await {
        warn!("failed to write run summary for {run_id}: {e}");
    }

    let counts = AuditCounts {
        finished: statuses.iter().filter(|s| **s == PageStatus::Finished).count(),
        errored: statuses.iter().filter(|s| **s == PageStatus::Errored).count(),
        skipped: statuses.iter().filter(|s| **s == PageStatus::Skipped).count(),
        redirected: statuses.iter().filter(|s| **s == PageStatus::Redirected).count(),
    };
    bus.publish(Event::new(run_id, None, EventKind::AuditCompleted { counts }));

    summary
}

async fn worker_loop(
    ctx: Arc<RunContext>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    statuses: Arc<Mutex<Vec<PageStatus>>>,
    module_scores: Arc<Mutex<HashMap<String, Vec<f64>>>>,
) {
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let url = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(url) = url else { break };

        let page_clock = Instant::now();
        let (status, scores) = process_url(&ctx, url).await;
        ctx.metrics.record_page(status, page_clock.elapsed());
        statuses.lock().await.push(status);
        let mut module_scores = module_scores.lock().await;
        for (module, score) in scores {
            module_scores.entry(module).or_default().push(score);
        }
    }
}

/// Drives one URL through the full attempt loop (spec.md §4.4 steps 1-7),
/// returning its terminal status and any module scores extracted from the
/// artifact for the run summary's averages.
async fn process_url(ctx: &RunContext, url: String) -> (PageStatus, Vec<(String, f64)>) {
    let mut task = UrlTask {
        url: url.clone(),
        attempt: 1,
        state: TaskState::Queued,
    };
    let mut rng = retry::seeded_rng(seed_from_url(&url));
    let base_delay = Duration::from_millis(ctx.config.base_retry_delay_ms);
    let started_at = chrono::Utc::now();

    loop {
        if ctx.cancel.is_cancelled() {
            task.state = TaskState::Skipped;
            return (PageStatus::Skipped, Vec::new());
        }
        task.state = TaskState::Running;
        ctx.bus.publish(Event::new(
            ctx.run_id.clone(),
            Some(url.clone()),
            EventKind::PageStarted,
        ));

        let session = match ctx.pool.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!("failed to acquire a browser session for {url}: {e}");
                return finish_errored(ctx, &url, None, &e, started_at).await;
            }
        };

        ctx.rate_limiter.acquire().await;
        if ctx.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.config.delay_ms)).await;
        }

        let mut page_ctx = PageContext::new(url.clone(), Box::new(session));
        let navigate_result = page_ctx
            .session
            .navigate(&url, crate::browser_pool::DEFAULT_NAVIGATE_TIMEOUT)
            .await;

        match navigate_result {
            Ok(observation) => {
                if !ctx.config.follow_redirects
                    && observation.final_url != url
                    && is_cross_origin(&url, &observation.final_url)
                {
                    let err = AuditError::Http3xxUnfollowed {
                        status: observation.status_code,
                        location: observation.final_url.clone(),
                    };
                    drop(page_ctx);
                    ctx.bus.publish(Event::new(
                        ctx.run_id.clone(),
                        Some(url.clone()),
                        EventKind::PageSkipped { reason: "redirect".to_string() },
                    ));
                    let artifact =
                        PageArtifact::error_stub(&ctx.run_id, &url, Some(observation), &err, started_at);
                    persist(ctx, &artifact).await;
                    return (PageStatus::Skipped, Vec::new());
                }

                if observation.redirect_chain.len() > ctx.config.max_redirects {
                    let to = observation.final_url.clone();
                    ctx.bus.publish(Event::new(
                        ctx.run_id.clone(),
                        Some(url.clone()),
                        EventKind::PageRedirected { to },
                    ));
                    page_ctx.http = Some(observation);
                    page_ctx.console_errors = page_ctx.session.console_errors().await;
                    page_ctx.finish();
                    let artifact = PageArtifact::from_context(&ctx.run_id, &page_ctx);
                    persist(ctx, &artifact).await;
                    return (PageStatus::Redirected, Vec::new());
                }

                if let Some(status_err) = AuditError::from_status(observation.status_code) {
                    drop(page_ctx);
                    if let Some(result) = retry_or_finish(
                        ctx,
                        &url,
                        status_err,
                        Some(observation),
                        &mut task,
                        &mut rng,
                        base_delay,
                        started_at,
                    )
                    .await
                    {
                        return result;
                    }
                    continue;
                }

                page_ctx.http = Some(observation);
                run_chain(ctx, &mut page_ctx).await;
                page_ctx.console_errors = page_ctx.session.console_errors().await;
                page_ctx.finish();

                let artifact = PageArtifact::from_context(&ctx.run_id, &page_ctx);
                let scores = extract_scores(&artifact);
                persist(ctx, &artifact).await;

                ctx.bus.publish(Event::new(
                    ctx.run_id.clone(),
                    Some(url.clone()),
                    EventKind::PageFinished,
                ));
                return (PageStatus::Finished, scores);
            }
            Err(e) => {
                drop(page_ctx);
                if let Some(result) =
                    retry_or_finish(ctx, &url, e, None, &mut task, &mut rng, base_delay, started_at).await
                {
                    return result;
                }
                continue;
            }
        }
    }
}

/// Shared retry-or-terminate decision for both navigation errors and a
/// post-navigation status classification (spec.md §4.4 step 6 / §7):
/// retryable errors schedule a backoff retry (`None`, loop continues);
/// anything else writes a terminal error-stub artifact and returns it.
#[allow(clippy::too_many_arguments)]
async fn retry_or_finish(
    ctx: &RunContext,
    url: &str,
    error: AuditError,
    http: Option<HttpObservation>,
    task: &mut UrlTask,
    rng: &mut rand::rngs::StdRng,
    base_delay: Duration,
    started_at: chrono::DateTime<chrono::Utc>,
) -> Option<(PageStatus, Vec<(String, f64)>)> {
    if error.is_retryable() && task.attempt <= ctx.config.max_retries {
        ctx.bus.publish(Event::new(
            ctx.run_id.clone(),
            Some(url.to_string()),
            EventKind::PageError { reason: error.to_string() },
        ));
        let delay = retry::delay(task.attempt, base_delay, rng);
        ctx.bus.publish(Event::new(
            ctx.run_id.clone(),
            Some(url.to_string()),
            EventKind::PageRetry {
                attempt: task.attempt + 1,
                delay_ms: delay.as_millis() as u64,
            },
        ));
        ctx.metrics.record_retry();
        tokio::time::sleep(delay).await;
        task.attempt += 1;
        None
    } else {
        Some(finish_errored(ctx, url, http, &error, started_at).await)
    }
}

async fn run_chain(ctx: &RunContext, page_ctx: &mut PageContext) {
    for module in &ctx.chain {
        ctx.bus.publish(Event::new(
            ctx.run_id.clone(),
            Some(page_ctx.url.clone()),
            EventKind::AuditAttached { module: module.name().to_string() },
        ));
        let module_clock = Instant::now();
        module.run(page_ctx).await;
        ctx.metrics.record_audit_module(module_clock.elapsed());
        ctx.bus.publish(Event::new(
            ctx.run_id.clone(),
            Some(page_ctx.url.clone()),
            EventKind::AuditFinished { module: module.name().to_string() },
        ));
    }
}

async fn finish_errored(
    ctx: &RunContext,
    url: &str,
    http: Option<HttpObservation>,
    error: &AuditError,
    started_at: chrono::DateTime<chrono::Utc>,
) -> (PageStatus, Vec<(String, f64)>) {
    ctx.bus.publish(Event::new(
        ctx.run_id.clone(),
        Some(url.to_string()),
        EventKind::PageError { reason: error.to_string() },
    ));
    let artifact = PageArtifact::error_stub(&ctx.run_id, url, http, error, started_at);
    persist(ctx, &artifact).await;
    (PageStatus::Errored, Vec::new())
}

async fn persist(ctx: &RunContext, artifact: &PageArtifact) {
    if let Err(e) = artifact::write_page_artifact(&ctx.paths, artifact).await {
        warn!("failed to persist artifact for {}: {e}", artifact.url);
        ctx.bus.publish(Event::new(
            ctx.run_id.clone(),
            Some(artifact.url.clone()),
            EventKind::PageError { reason: "persist".to_string() },
        ));
    }
}

fn extract_scores(artifact: &PageArtifact) -> Vec<(String, f64)> {
    let mut scores = Vec::new();
    for (name, value) in [
        ("performance", &artifact.perf),
        ("seo", &artifact.seo),
        ("mobile", &artifact.mobile),
    ] {
        if let Some(score) = value.as_ref().and_then(|v| v.get("score")).and_then(|v| v.as_f64()) {
            scores.push((name.to_string(), score));
        }
    }
    scores
}

fn is_cross_origin(original: &str, redirected: &str) -> bool {
    let origin = |u: &str| url::Url::parse(u).ok().map(|p| (p.scheme().to_string(), p.host_str().map(str::to_string)));
    origin(original) != origin(redirected)
}

/// Deterministic per-URL retry jitter seed, so a run's backoff sequence is
/// stable across retries of the *same* URL without sharing one RNG across
/// concurrent workers (which would require synchronization for no benefit).
fn seed_from_url(url: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    url.hash(&mut hasher);
    hasher.finish()
}

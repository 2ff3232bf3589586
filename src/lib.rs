//! # Site Auditor
//!
//! Crawls a site's sitemap, drives a headless-Chrome page per discovered
//! URL, and runs a fixed chain of audit modules (HTTP, Performance,
//! Accessibility, SEO, ContentWeight, Mobile) against each one, writing a
//! JSON artifact per page plus a run summary. A live event bus streams
//! per-URL lifecycle events, exposed over HTTP and WebSocket.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use site_auditor::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         sitemap_url: Some("https://example.com/sitemap.xml".to_string()),
//!         output_dir: "./audit-output".to_string(),
//!         ..Default::default()
//!     };
//!     config.validate()?;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! site-auditor audit --sitemap-url https://example.com/sitemap.xml --output-dir ./out
//! site-auditor serve --port 8080
//! site-auditor validate --config ./config.json
//! ```

/// Run configuration, validation, and environment overrides.
pub mod config;

/// Error taxonomy and circuit breaker.
pub mod error;

/// Single-process browser pool handing out recycled page sessions.
pub mod browser_pool;

/// Per-page shared state passed through the audit chain.
pub mod page_context;

/// The six audit modules and the chain they're assembled into.
pub mod audits;

/// Sitemap fetching, index expansion, and include/exclude filtering.
pub mod sitemap;

/// Token-bucket rate limiting for outbound navigations.
pub mod rate_limiter;

/// Exponential backoff with jitter for retried attempts.
pub mod retry;

/// In-process multi-subscriber event broadcast.
pub mod events;

/// Atomic on-disk artifact writer.
pub mod artifact;

/// Bounded-concurrency work queue driving each URL through the audit chain.
pub mod queue;

/// Run orchestration: resolves a `Config` into a URL list and owns its queue.
pub mod run;

/// HTTP + WebSocket control surface.
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// Performance metrics collection and monitoring
pub mod metrics;

/// Process health reporting backing `GET /health` and `GET /status`.
pub mod health;

#[cfg(test)]
mod tests;

pub use artifact::{PageArtifact, RunPaths, RunSummary};
pub use browser_pool::{BrowserPool, Session};
pub use config::{Config, EnvOverrides, PerformanceBudget};
pub use error::{AuditError, CircuitBreaker};
pub use events::{Event, EventBus, EventKind};
pub use page_context::{HttpObservation, PageContext, ResultFragment};
pub use rate_limiter::RateLimiter;
pub use run::{RunHandle, RunManager};

//! Token-bucket rate limiter, safe under N concurrent waiters woken FIFO.
//!
//! The teacher's `RateLimiter` (`utils.rs`) is a sliding-window counter that
//! callers poll with `wait_for_permit`'s 10ms busy-sleep loop — fine for a
//! handful of screenshot workers, but it gives no FIFO guarantee and wastes
//! a tick even when a permit is already free. This replaces it with a
//! capacity-1 bucket built on `tokio::sync::Semaphore`, whose waiter queue
//! is already FIFO: `acquire()` takes the single permit, and a detached task
//! puts it back after `1/rate` seconds, pacing the next waiter in line.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// `None` rate means unconditional pass-through (spec: "unset limit =
/// unconditional pass-through").
pub struct RateLimiter {
    rate: Option<f64>,
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(requests_per_second: Option<f64>) -> Self {
        Self {
            rate: requests_per_second,
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Blocks until a token is available. Waiters queue on the semaphore and
    /// are released in arrival order, giving FIFO fairness under contention.
    pub async fn acquire(&self) {
        let Some(rate) = self.rate else {
            return;
        };

        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("rate limiter semaphore is never closed");
        permit.forget();

        let semaphore = self.semaphore.clone();
        let refill_after = Duration::from_secs_f64(1.0 / rate);
        tokio::spawn(async move {
            tokio::time::sleep(refill_after).await;
            semaphore.add_permits(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn unset_rate_never_blocks() {
        let limiter = RateLimiter::new(None);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn paces_requests_at_configured_rate() {
        let limiter = Arc::new(RateLimiter::new(Some(20.0)));
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        // 5 acquisitions at 20/s: first is free, remaining 4 cost ~50ms each.
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn many_concurrent_waiters_all_eventually_proceed() {
        let limiter = Arc::new(RateLimiter::new(Some(50.0)));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}

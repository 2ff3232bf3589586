use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("sitemap fetch/parse failed: {0}")]
    SitemapFetchError(String),

    #[error("navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("browser session crashed: {0}")]
    SessionCrash(String),

    #[error("transient server error: {status}")]
    Http5xxTransient { status: u16 },

    #[error("client error: {status}")]
    Http4xx { status: u16 },

    #[error("unfollowed redirect ({status}) to {location}")]
    Http3xxUnfollowed { status: u16, location: String },

    #[error("audit module '{module}' failed: {reason}")]
    ModuleError { module: String, reason: String },

    #[error("failed to persist artifact: {0}")]
    PersistError(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunchError(String),
}

impl AuditError {
    /// Whether a worker should retry the URL this error occurred on.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditError::NavigationTimeout(_)
                | AuditError::SessionCrash(_)
                | AuditError::Http5xxTransient { .. }
        )
    }

    /// Whether this error should abort the whole run rather than just the
    /// URL it occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::ConfigError(_)
                | AuditError::SitemapFetchError(_)
                | AuditError::BrowserLaunchError(_)
        )
    }

    /// Classifies a navigated response's status code into the retry/terminal
    /// taxonomy; `None` for 2xx and for 3xx the queue is willing to follow.
    pub fn from_status(status: u16) -> Option<AuditError> {
        match status {
            500..=599 => Some(AuditError::Http5xxTransient { status }),
            400..=499 => Some(AuditError::Http4xx { status }),
            _ => None,
        }
    }

    /// Wire code reported in `error.code` on HTTP responses and event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::ConfigError(_) => "ConfigError",
            AuditError::SitemapFetchError(_) => "SitemapFetchError",
            AuditError::NavigationTimeout(_) => "NavigationTimeout",
            AuditError::SessionCrash(_) => "SessionCrash",
            AuditError::Http5xxTransient { .. } => "Http5xxTransient",
            AuditError::Http4xx { .. } => "Http4xx",
            AuditError::Http3xxUnfollowed { .. } => "Http3xxUnfollowed",
            AuditError::ModuleError { .. } => "ModuleError",
            AuditError::PersistError(_) => "PersistError",
            AuditError::BrowserLaunchError(_) => "BrowserLaunchError",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: std::sync::Arc<std::sync::Mutex<CircuitState>>,
    failure_threshold: usize,
    recovery_timeout: Duration,
    failure_count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    last_failure_time: std::sync::Arc<std::sync::Mutex<Option<std::time::Instant>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            state: std::sync::Arc::new(std::sync::Mutex::new(CircuitState::Closed)),
            failure_threshold,
            recovery_timeout,
            failure_count: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            last_failure_time: std::sync::Arc::new(std::sync::Mutex::new(None)),
        }
    }

    pub fn can_execute(&self) -> bool {
        let state = *self.state.lock().unwrap();
        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Some(last_failure) = *self.last_failure_time.lock().unwrap() {
                    if last_failure.elapsed() > self.recovery_timeout {
                        *self.state.lock().unwrap() = CircuitState::HalfOpen;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        self.failure_count
            .store(0, std::sync::atomic::Ordering::Relaxed);
        *self.state.lock().unwrap() = CircuitState::Closed;
        *self.last_failure_time.lock().unwrap() = None;
    }

    pub fn record_failure(&self) {
        let failures = self
            .failure_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        *self.last_failure_time.lock().unwrap() = Some(std::time::Instant::now());

        if failures >= self.failure_threshold {
            *self.state.lock().unwrap() = CircuitState::Open;
        }
    }

    pub fn get_state(&self) -> CircuitState {
        *self.state.lock().unwrap()
    }

    pub fn get_failure_count(&self) -> usize {
        self.failure_count
            .load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::PersistError(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::PersistError(err.to_string())
    }
}

impl From<regex::Error> for AuditError {
    fn from(err: regex::Error) -> Self {
        AuditError::ConfigError(format!("invalid regex: {err}"))
    }
}

impl From<quick_xml::Error> for AuditError {
    fn from(err: quick_xml::Error) -> Self {
        AuditError::SitemapFetchError(err.to_string())
    }
}

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        AuditError::SitemapFetchError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(AuditError::NavigationTimeout(Duration::from_secs(30)).is_retryable());
        assert!(AuditError::SessionCrash("crash".into()).is_retryable());
        assert!(AuditError::Http5xxTransient { status: 503 }.is_retryable());
        assert!(!AuditError::Http4xx { status: 404 }.is_retryable());
        assert!(!AuditError::ConfigError("bad".into()).is_retryable());
    }

    #[test]
    fn status_classification_drives_retry_vs_terminal() {
        assert!(matches!(AuditError::from_status(503), Some(AuditError::Http5xxTransient { status: 503 })));
        assert!(matches!(AuditError::from_status(404), Some(AuditError::Http4xx { status: 404 })));
        assert!(AuditError::from_status(200).is_none());
        assert!(AuditError::from_status(301).is_none());
    }

    #[test]
    fn fatal_errors() {
        assert!(AuditError::ConfigError("bad".into()).is_fatal());
        assert!(AuditError::SitemapFetchError("bad".into()).is_fatal());
        assert!(AuditError::BrowserLaunchError("bad".into()).is_fatal());
        assert!(!AuditError::Http4xx { status: 404 }.is_fatal());
        assert!(!AuditError::ModuleError {
            module: "seo".into(),
            reason: "x".into()
        }
        .is_fatal());
    }

    #[test]
    fn wire_codes() {
        assert_eq!(AuditError::ConfigError("x".into()).code(), "ConfigError");
        assert_eq!(
            AuditError::Http3xxUnfollowed {
                status: 301,
                location: "x".into()
            }
            .code(),
            "Http3xxUnfollowed"
        );
    }

    #[test]
    fn circuit_breaker_opens_after_threshold() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50));
        assert!(cb.can_execute());
        cb.record_failure();
        assert!(cb.can_execute());
        cb.record_failure();
        assert_eq!(cb.get_state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(30));
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.get_failure_count(), 0);
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }
}

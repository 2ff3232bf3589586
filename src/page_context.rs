//! `PageContext`: the short-lived state one worker owns for the duration of
//! one URL attempt.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::browser_pool::Session;

/// The HTTP facts observed while navigating to a page.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct HttpObservation {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub final_url: String,
    pub redirect_chain: Vec<String>,
    pub ttfb_ms: u64,
}

/// One audit module's outcome for a page: either its JSON-shaped result, or
/// an error entry. Write-once: a module either succeeds or records an
/// error, never both, and never more than once.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ResultFragment {
    Ok(serde_json::Value),
    Error { error: String },
}

/// Owned exclusively by one worker for the duration of one (task, attempt)
/// pair. Holds the acquired browser session and accumulates audit results.
pub struct PageContext {
    pub url: String,
    pub session: Box<dyn Session>,
    pub http: Option<HttpObservation>,
    fragments: HashMap<&'static str, ResultFragment>,
    pub console_errors: Vec<String>,
    pub screenshot_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set by the HTTP module when the response status is >= 400. Later
    /// modules in the chain check this and emit an empty fragment instead of
    /// driving the (broken) page.
    pub should_skip_rendering: bool,
}

impl PageContext {
    pub fn new(url: String, session: Box<dyn Session>) -> Self {
        Self {
            url,
            session,
            http: None,
            fragments: HashMap::new(),
            console_errors: Vec::new(),
            screenshot_path: None,
            started_at: Utc::now(),
            finished_at: None,
            should_skip_rendering: false,
        }
    }

    /// Records a module's result. Panics on a second write for the same
    /// module name — the per-module write-once invariant is enforced by the
    /// audit chain calling this at most once per module, so a violation
    /// here indicates a bug in the chain, not bad input.
    pub fn record(&mut self, module: &'static str, fragment: ResultFragment) {
        if self.fragments.contains_key(module) {
            panic!("audit module '{module}' attempted to record a result twice");
        }
        self.fragments.insert(module, fragment);
    }

    pub fn fragment(&self, module: &str) -> Option<&ResultFragment> {
        self.fragments.get(module)
    }

    pub fn fragments(&self) -> &HashMap<&'static str, ResultFragment> {
        &self.fragments
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::test_support::noop_session;

    #[test]
    fn record_then_read_fragment() {
        let mut ctx = PageContext::new("https://example.com".into(), noop_session());
        ctx.record("http", ResultFragment::Ok(serde_json::json!({"status": 200})));
        assert!(matches!(ctx.fragment("http"), Some(ResultFragment::Ok(_))));
        assert!(ctx.fragment("seo").is_none());
    }

    #[test]
    #[should_panic(expected = "attempted to record a result twice")]
    fn record_twice_panics() {
        let mut ctx = PageContext::new("https://example.com".into(), noop_session());
        ctx.record("http", ResultFragment::Ok(serde_json::json!({})));
        ctx.record("http", ResultFragment::Error { error: "x".into() });
    }

    #[test]
    fn finish_sets_finished_at() {
        let mut ctx = PageContext::new("https://example.com".into(), noop_session());
        assert!(ctx.finished_at.is_none());
        ctx.finish();
        assert!(ctx.finished_at.is_some());
    }
}

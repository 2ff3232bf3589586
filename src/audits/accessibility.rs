//! Accessibility module: injects a third-party analyzer script and captures
//! its structured violation report. A missing analyzer file is tolerated —
//! the page still finishes, with an empty violation list and a module error
//! recorded on the fragment rather than aborting the page.

use async_trait::async_trait;

use crate::audits::AuditModule;
use crate::page_context::{PageContext, ResultFragment};

pub struct AccessibilityModule {
    analyzer_path: String,
}

impl AccessibilityModule {
    pub fn new(analyzer_path: String) -> Self {
        Self { analyzer_path }
    }
}

#[async_trait]
impl AuditModule for AccessibilityModule {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    async fn run(&self, ctx: &mut PageContext) {
        if ctx.should_skip_rendering {
            ctx.record(self.name(), ResultFragment::Ok(serde_json::json!({ "violations": [] })));
            return;
        }

        let script = match tokio::fs::read_to_string(&self.analyzer_path).await {
            Ok(script) => script,
            Err(e) => {
                ctx.record(
                    self.name(),
                    ResultFragment::Ok(serde_json::json!({
                        "violations": [],
                        "error": {
                            "code": "ModuleError",
                            "message": format!("analyzer script not found at {}: {e}", self.analyzer_path),
                        }
                    })),
                );
                return;
            }
        };

        let fragment = match ctx.session.evaluate(&script).await {
            Ok(value) => ResultFragment::Ok(value),
            Err(e) => ResultFragment::Error { error: e.to_string() },
        };
        ctx.record(self.name(), fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::test_support::ScriptedSession;
    use crate::page_context::HttpObservation;

    #[tokio::test]
    async fn missing_analyzer_file_yields_empty_violations_with_module_error() {
        let session = ScriptedSession::new(HttpObservation::default());
        let mut ctx = PageContext::new("https://example.com".into(), Box::new(session));

        AccessibilityModule::new("/nonexistent/analyzer.js".into())
            .run(&mut ctx)
            .await;

        let ResultFragment::Ok(value) = ctx.fragment("accessibility").unwrap().clone() else {
            panic!("expected Ok fragment even when the analyzer file is missing");
        };
        assert_eq!(value["violations"], serde_json::json!([]));
        assert_eq!(value["error"]["code"], serde_json::json!("ModuleError"));
    }

    #[tokio::test]
    async fn skip_flag_yields_empty_violations_without_reading_analyzer() {
        let session = ScriptedSession::new(HttpObservation::default());
        let mut ctx = PageContext::new("https://example.com".into(), Box::new(session));
        ctx.should_skip_rendering = true;

        AccessibilityModule::new("/nonexistent/analyzer.js".into())
            .run(&mut ctx)
            .await;

        let ResultFragment::Ok(value) = ctx.fragment("accessibility").unwrap().clone() else {
            panic!("expected Ok fragment");
        };
        assert_eq!(value["violations"], serde_json::json!([]));
        assert!(value.get("error").is_none());
    }

    #[tokio::test]
    async fn analyzer_result_is_recorded_verbatim() {
        let analyzer = serde_json::json!({
            "violations": [{
                "id": "color-contrast",
                "impact": "serious",
                "help": "Elements must meet contrast ratio thresholds",
                "description": "...",
                "nodes": [{"html": "<p>x</p>", "target": [".x"]}],
            }]
        });
        let session = ScriptedSession::new(HttpObservation::default()).push_eval(analyzer.clone());
        let dir = tempfile::tempdir().unwrap();
        let analyzer_path = dir.path().join("analyzer.js");
        tokio::fs::write(&analyzer_path, "({violations: []})").await.unwrap();

        let mut ctx = PageContext::new("https://example.com".into(), Box::new(session));
        AccessibilityModule::new(analyzer_path.to_str().unwrap().to_string())
            .run(&mut ctx)
            .await;

        assert_eq!(
            ctx.fragment("accessibility"),
            Some(&ResultFragment::Ok(analyzer))
        );
    }
}

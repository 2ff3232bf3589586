//! Mobile module: viewport meta correctness, touch-target sizing, body
//! font-size floor, and horizontal-overflow detection.
//!
//! Emulates the 360px mobile viewport via the session's CDP device-metrics
//! override before evaluating, then restores a desktop viewport so later
//! URLs (the session is recycled across the pool) and any later chain
//! modules see normal layout again.

use async_trait::async_trait;
use tracing::warn;

use crate::audits::AuditModule;
use crate::browser_pool::{DESKTOP_VIEWPORT, MOBILE_VIEWPORT};
use crate::page_context::{PageContext, ResultFragment};

const MOBILE_SCRIPT: &str = r#"
(() => {
  const viewportMeta = document.querySelector('meta[name="viewport"]');
  const viewportContent = viewportMeta?.getAttribute('content') ?? null;
  const viewportCorrect = /width=device-width/.test(viewportContent || '');

  const interactive = Array.from(document.querySelectorAll('a, button, input, select, textarea'));
  let undersizedTouchTargets = 0;
  for (const el of interactive) {
    const rect = el.getBoundingClientRect();
    if (rect.width > 0 && rect.height > 0 && (rect.width < 44 || rect.height < 44)) {
      undersizedTouchTargets += 1;
    }
  }

  const bodyFontSize = parseFloat(getComputedStyle(document.body).fontSize) || 0;
  const horizontalOverflow = document.documentElement.scrollWidth > window.innerWidth;

  return {
    viewportContent,
    viewportCorrect,
    touchTargetCount: interactive.length,
    undersizedTouchTargets,
    bodyFontSizePx: bodyFontSize,
    horizontalOverflow,
  };
})()
"#;

pub struct MobileModule;

#[async_trait]
impl AuditModule for MobileModule {
    fn name(&self) -> &'static str {
        "mobile"
    }

    async fn run(&self, ctx: &mut PageContext) {
        if ctx.should_skip_rendering {
            ctx.record(self.name(), ResultFragment::Ok(serde_json::json!({})));
            return;
        }

        let (mobile_width, mobile_height) = MOBILE_VIEWPORT;
        if let Err(e) = ctx.session.set_viewport(mobile_width, mobile_height, true).await {
            ctx.record(self.name(), ResultFragment::Error { error: e.to_string() });
            return;
        }

        let fragment = match ctx.session.evaluate(MOBILE_SCRIPT).await {
            Ok(value) => ResultFragment::Ok(score_signals(value)),
            Err(e) => ResultFragment::Error { error: e.to_string() },
        };

        let (desktop_width, desktop_height) = DESKTOP_VIEWPORT;
        if let Err(e) = ctx.session.set_viewport(desktop_width, desktop_height, false).await {
            warn!("failed to restore desktop viewport after the mobile module ran: {e}");
        }

        ctx.record(self.name(), fragment);
    }
}

/// Four equally-weighted checks: correct viewport meta, no undersized touch
/// targets, body font size >= 16px, no horizontal overflow.
fn score_signals(mut raw: serde_json::Value) -> serde_json::Value {
    let viewport_correct = raw.get("viewportCorrect").and_then(|v| v.as_bool()).unwrap_or(false);
    let no_undersized_targets = raw
        .get("undersizedTouchTargets")
        .and_then(|v| v.as_u64())
        .map(|n| n == 0)
        .unwrap_or(false);
    let font_floor_met = raw
        .get("bodyFontSizePx")
        .and_then(|v| v.as_f64())
        .map(|px| px >= 16.0)
        .unwrap_or(false);
    let no_overflow = raw
        .get("horizontalOverflow")
        .and_then(|v| v.as_bool())
        .map(|overflow| !overflow)
        .unwrap_or(false);

    let checks = [viewport_correct, no_undersized_targets, font_floor_met, no_overflow];
    let passed = checks.iter().filter(|&&c| c).count();
    let score = passed as f64 / checks.len() as f64 * 100.0;

    if let Some(obj) = raw.as_object_mut() {
        obj.insert("score".to_string(), serde_json::json!(score));
        obj.insert(
            "details".to_string(),
            serde_json::json!({
                "viewportCorrect": viewport_correct,
                "noUndersizedTouchTargets": no_undersized_targets,
                "fontFloorMet": font_floor_met,
                "noHorizontalOverflow": no_overflow,
            }),
        );
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::test_support::ScriptedSession;
    use crate::page_context::HttpObservation;

    #[test]
    fn full_marks_when_all_checks_pass() {
        let raw = serde_json::json!({
            "viewportCorrect": true,
            "undersizedTouchTargets": 0,
            "bodyFontSizePx": 16.0,
            "horizontalOverflow": false,
        });
        assert_eq!(score_signals(raw)["score"], serde_json::json!(100.0));
    }

    #[test]
    fn half_marks_when_two_of_four_checks_fail() {
        let raw = serde_json::json!({
            "viewportCorrect": false,
            "undersizedTouchTargets": 3,
            "bodyFontSizePx": 16.0,
            "horizontalOverflow": false,
        });
        assert_eq!(score_signals(raw)["score"], serde_json::json!(50.0));
    }

    #[tokio::test]
    async fn skip_flag_yields_empty_fragment() {
        let session = ScriptedSession::new(HttpObservation::default());
        let mut ctx = PageContext::new("https://example.com".into(), Box::new(session));
        ctx.should_skip_rendering = true;

        MobileModule.run(&mut ctx).await;

        assert_eq!(ctx.fragment("mobile"), Some(&ResultFragment::Ok(serde_json::json!({}))));
    }
}

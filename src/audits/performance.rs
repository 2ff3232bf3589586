//! Performance module: reads Navigation Timing / Paint Timing via an
//! injected script, scores each present metric against a named budget's
//! thresholds, and rolls the scores into an overall grade.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::audits::AuditModule;
use crate::config::PerformanceBudget;
use crate::page_context::{PageContext, ResultFragment};

const PERFORMANCE_SCRIPT: &str = r#"
(() => {
  const nav = performance.getEntriesByType('navigation')[0];
  const paint = performance.getEntriesByType('paint');
  const fcp = paint.find(p => p.name === 'first-contentful-paint');
  const lcpEntries = performance.getEntriesByType('largest-contentful-paint');
  const lcp = lcpEntries.length ? lcpEntries[lcpEntries.length - 1] : null;
  let cls = 0;
  for (const entry of performance.getEntriesByType('layout-shift')) {
    if (!entry.hadRecentInput) cls += entry.value;
  }
  return {
    ttfbMs: nav ? nav.responseStart : null,
    fcpMs: fcp ? fcp.startTime : null,
    lcpMs: lcp ? lcp.startTime : null,
    clsScore: cls,
    inpMs: null,
    domContentLoadedMs: nav ? nav.domContentLoadedEventEnd : null,
    loadEventEndMs: nav ? nav.loadEventEnd : null,
  };
})()
"#;

/// `(good, needsWork, max)` per metric, indexed by budget.
struct Thresholds {
    good: f64,
    needs_work: f64,
    max: f64,
}

fn thresholds(metric: &str, budget: PerformanceBudget) -> Option<Thresholds> {
    thresholds_table(metric).map(|rows| {
        let (good, needs_work, max) = rows[budget_index(budget)];
        Thresholds { good, needs_work, max }
    })
}

fn budget_index(budget: PerformanceBudget) -> usize {
    match budget {
        PerformanceBudget::Default => 0,
        PerformanceBudget::Ecommerce => 1,
        PerformanceBudget::Corporate => 2,
        PerformanceBudget::Blog => 3,
    }
}

/// The performance budget thresholds table, reproduced verbatim: metric ->
/// `[default, ecommerce, corporate, blog]` each as `(good, needsWork, max)`.
fn thresholds_table(metric: &str) -> Option<[(f64, f64, f64); 4]> {
    match metric {
        "lcpMs" => Some([
            (2500., 4000., 6000.),
            (2000., 3000., 4000.),
            (2500., 4000., 5500.),
            (3000., 4500., 6000.),
        ]),
        "fcpMs" => Some([
            (1800., 3000., 4500.),
            (1500., 2500., 3500.),
            (1800., 3000., 4000.),
            (2000., 3500., 5000.),
        ]),
        "clsScore" => Some([
            (0.1, 0.25, 0.5),
            (0.05, 0.1, 0.25),
            (0.1, 0.25, 0.4),
            (0.1, 0.25, 0.5),
        ]),
        "inpMs" => Some([
            (200., 500., 1000.),
            (150., 300., 500.),
            (200., 500., 800.),
            (300., 600., 1000.),
        ]),
        "ttfbMs" => Some([
            (800., 1800., 3000.),
            (600., 1200., 2000.),
            (800., 1800., 2500.),
            (1000., 2000., 3500.),
        ]),
        "tbtMs" => Some([
            (200., 600., 1500.),
            (150., 350., 600.),
            (200., 600., 1200.),
            (300., 800., 1500.),
        ]),
        _ => None,
    }
}

/// `100` at/under `good`; linear 100→70 between `good` and `needsWork`;
/// linear 70→30 between `needsWork` and `max`; exponential decay below 30
/// past `max`. Monotonically non-increasing in `value`.
fn score_metric(value: f64, t: &Thresholds) -> f64 {
    if value <= t.good {
        100.0
    } else if value <= t.needs_work {
        100.0 - (value - t.good) / (t.needs_work - t.good) * 30.0
    } else if value <= t.max {
        70.0 - (value - t.needs_work) / (t.max - t.needs_work) * 40.0
    } else {
        30.0 * (-(value - t.max) / t.max).exp()
    }
}

fn grade_for(score: f64) -> &'static str {
    if score >= 90.0 {
        "A"
    } else if score >= 80.0 {
        "B"
    } else if score >= 70.0 {
        "C"
    } else if score >= 60.0 {
        "D"
    } else {
        "F"
    }
}

fn budget_name(budget: PerformanceBudget) -> &'static str {
    match budget {
        PerformanceBudget::Default => "default",
        PerformanceBudget::Ecommerce => "ecommerce",
        PerformanceBudget::Corporate => "corporate",
        PerformanceBudget::Blog => "blog",
    }
}

pub struct PerformanceModule {
    pub budget: PerformanceBudget,
}

#[async_trait]
impl AuditModule for PerformanceModule {
    fn name(&self) -> &'static str {
        "performance"
    }

    async fn run(&self, ctx: &mut PageContext) {
        if ctx.should_skip_rendering {
            ctx.record(self.name(), ResultFragment::Ok(serde_json::json!({})));
            return;
        }

        let fragment = match ctx.session.evaluate(PERFORMANCE_SCRIPT).await {
            Ok(value) => ResultFragment::Ok(self.score(&value)),
            Err(e) => ResultFragment::Error { error: e.to_string() },
        };
        ctx.record(self.name(), fragment);
    }
}

impl PerformanceModule {
    fn score(&self, raw: &serde_json::Value) -> serde_json::Value {
        let metric_names = [
            "ttfbMs",
            "fcpMs",
            "lcpMs",
            "clsScore",
            "inpMs",
            "domContentLoadedMs",
            "loadEventEndMs",
        ];

        let mut present_scores = HashMap::new();
        for &name in &metric_names {
            let Some(value) = raw.get(name).and_then(|v| v.as_f64()) else {
                continue;
            };
            if let Some(t) = thresholds(name, self.budget) {
                present_scores.insert(name, score_metric(value, &t));
            }
        }

        let overall = if present_scores.is_empty() {
            0.0
        } else {
            present_scores.values().sum::<f64>() / present_scores.len() as f64
        };

        let mut result = raw.clone();
        if let Some(obj) = result.as_object_mut() {
            obj.insert("grade".to_string(), serde_json::json!(grade_for(overall)));
            obj.insert("score".to_string(), serde_json::json!(overall));
            obj.insert("budget".to_string(), serde_json::json!(budget_name(self.budget)));
        }
        result
    }
}

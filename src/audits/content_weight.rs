//! ContentWeight module: aggregates transfer size and counts per resource
//! type from the Resource Timing API, with a compression-ratio estimate
//! wherever both transfer and decoded sizes were reported.

use async_trait::async_trait;

use crate::audits::AuditModule;
use crate::page_context::{PageContext, ResultFragment};

const CONTENT_WEIGHT_SCRIPT: &str = r#"
(() => {
  const categoryFor = (entry) => {
    switch (entry.initiatorType) {
      case 'script': return 'script';
      case 'link': case 'css': return 'stylesheet';
      case 'img': case 'image': return 'image';
      case 'css-font-face-rule': case 'font': return 'font';
      case 'video': case 'audio': return 'media';
      default: return entry.name === location.href ? 'document' : 'other';
    }
  };
  const byType = {};
  const nav = performance.getEntriesByType('navigation')[0];
  if (nav) {
    byType.document = {
      transferSize: nav.transferSize || 0,
      decodedSize: nav.decodedBodySize || 0,
      count: 1,
    };
  }
  for (const entry of performance.getEntriesByType('resource')) {
    const cat = categoryFor(entry);
    const bucket = byType[cat] || { transferSize: 0, decodedSize: 0, count: 0 };
    bucket.transferSize += entry.transferSize || 0;
    bucket.decodedSize += entry.decodedBodySize || 0;
    bucket.count += 1;
    byType[cat] = bucket;
  }
  return byType;
})()
"#;

pub struct ContentWeightModule;

#[async_trait]
impl AuditModule for ContentWeightModule {
    fn name(&self) -> &'static str {
        "content_weight"
    }

    async fn run(&self, ctx: &mut PageContext) {
        if ctx.should_skip_rendering {
            ctx.record(self.name(), ResultFragment::Ok(serde_json::json!({})));
            return;
        }

        let fragment = match ctx.session.evaluate(CONTENT_WEIGHT_SCRIPT).await {
            Ok(value) => ResultFragment::Ok(summarize(value)),
            Err(e) => ResultFragment::Error { error: e.to_string() },
        };
        ctx.record(self.name(), fragment);
    }
}

/// Adds a `totalTransferSize` rollup and a per-type `compressionRatio`
/// (`1 - transferSize/decodedSize`, `None` when sizes weren't reported).
fn summarize(raw: serde_json::Value) -> serde_json::Value {
    let mut total_transfer_size: u64 = 0;
    let mut by_type = serde_json::Map::new();

    if let Some(obj) = raw.as_object() {
        for (category, bucket) in obj {
            let transfer_size = bucket.get("transferSize").and_then(|v| v.as_u64()).unwrap_or(0);
            let decoded_size = bucket.get("decodedSize").and_then(|v| v.as_u64()).unwrap_or(0);
            let count = bucket.get("count").and_then(|v| v.as_u64()).unwrap_or(0);

            total_transfer_size += transfer_size;
            let compression_ratio = if decoded_size > 0 {
                Some(1.0 - (transfer_size as f64 / decoded_size as f64))
            } else {
                None
            };

            by_type.insert(
                category.clone(),
                serde_json::json!({
                    "transferSize": transfer_size,
                    "decodedSize": decoded_size,
                    "count": count,
                    "compressionRatio": compression_ratio,
                }),
            );
        }
    }

    serde_json::json!({
        "totalTransferSize": total_transfer_size,
        "byType": by_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::test_support::ScriptedSession;
    use crate::page_context::HttpObservation;

    #[test]
    fn sums_transfer_size_across_types_and_computes_compression_ratio() {
        let raw = serde_json::json!({
            "document": {"transferSize": 4000, "decodedSize": 20000, "count": 1},
            "script": {"transferSize": 1000, "decodedSize": 1000, "count": 3},
        });
        let summary = summarize(raw);
        assert_eq!(summary["totalTransferSize"], serde_json::json!(5000));
        assert_eq!(summary["byType"]["document"]["compressionRatio"], serde_json::json!(0.8));
        assert_eq!(summary["byType"]["script"]["compressionRatio"], serde_json::json!(0.0));
    }

    #[test]
    fn compression_ratio_is_null_when_decoded_size_unreported() {
        let raw = serde_json::json!({
            "other": {"transferSize": 500, "decodedSize": 0, "count": 1},
        });
        let summary = summarize(raw);
        assert!(summary["byType"]["other"]["compressionRatio"].is_null());
    }

    #[tokio::test]
    async fn skip_flag_yields_empty_fragment() {
        let session = ScriptedSession::new(HttpObservation::default());
        let mut ctx = PageContext::new("https://example.com".into(), Box::new(session));
        ctx.should_skip_rendering = true;

        ContentWeightModule.run(&mut ctx).await;

        assert_eq!(
            ctx.fragment("content_weight"),
            Some(&ResultFragment::Ok(serde_json::json!({})))
        );
    }
}

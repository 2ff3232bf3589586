//! SEO module: evaluates a DOM-inspection script and layers a module-defined
//! `[0,100]` score on top of the raw signals it returns.
//!
//! The scoring heuristic (see `score_signals`) was not specified upstream;
//! per the Open Question resolution in DESIGN.md this module picks a simple,
//! documented rubric rather than guessing at a product owner's intent.

use async_trait::async_trait;

use crate::audits::AuditModule;
use crate::page_context::{PageContext, ResultFragment};

const SEO_SCRIPT: &str = r#"
(() => {
  const og = {};
  document.querySelectorAll('meta[property^="og:"]').forEach(m => {
    og[m.getAttribute('property')] = m.getAttribute('content');
  });
  const twitter = {};
  document.querySelectorAll('meta[name^="twitter:"]').forEach(m => {
    twitter[m.getAttribute('name')] = m.getAttribute('content');
  });
  const headings = {};
  for (let level = 1; level <= 6; level++) {
    headings['h' + level] = Array.from(document.querySelectorAll('h' + level)).map(h => h.textContent.trim());
  }
  const images = Array.from(document.querySelectorAll('img'));
  const links = Array.from(document.querySelectorAll('a[href]'));
  const structuredData = Array.from(document.querySelectorAll('script[type="application/ld+json"]'))
    .map(s => s.textContent);
  return {
    title: document.title || null,
    metaDescription: document.querySelector('meta[name="description"]')?.getAttribute('content') ?? null,
    canonical: document.querySelector('link[rel="canonical"]')?.getAttribute('href') ?? null,
    robots: document.querySelector('meta[name="robots"]')?.getAttribute('content') ?? null,
    viewport: document.querySelector('meta[name="viewport"]')?.getAttribute('content') ?? null,
    openGraph: og,
    twitterCard: twitter,
    headings,
    imageCount: images.length,
    imagesWithAlt: images.filter(i => i.getAttribute('alt')).length,
    imagesWithoutAlt: images.filter(i => !i.hasAttribute('alt')).length,
    imagesWithEmptyAlt: images.filter(i => i.getAttribute('alt') === '').length,
    imagesLazyLoaded: images.filter(i => i.getAttribute('loading') === 'lazy').length,
    internalLinkCount: links.filter(a => a.hostname === location.hostname).length,
    externalLinkCount: links.filter(a => a.hostname !== location.hostname).length,
    nofollowLinkCount: links.filter(a => (a.getAttribute('rel') || '').includes('nofollow')).length,
    wordCount: (document.body?.innerText || '').trim().split(/\s+/).filter(Boolean).length,
    paragraphCount: document.querySelectorAll('p').length,
    structuredData,
    htmlByteSize: new Blob([document.documentElement.outerHTML]).size,
  };
})()
"#;

pub struct SeoModule;

#[async_trait]
impl AuditModule for SeoModule {
    fn name(&self) -> &'static str {
        "seo"
    }

    async fn run(&self, ctx: &mut PageContext) {
        if ctx.should_skip_rendering {
            ctx.record(self.name(), ResultFragment::Ok(serde_json::json!({})));
            return;
        }

        let fragment = match ctx.session.evaluate(SEO_SCRIPT).await {
            Ok(value) => ResultFragment::Ok(score_signals(value)),
            Err(e) => ResultFragment::Error { error: e.to_string() },
        };
        ctx.record(self.name(), fragment);
    }
}

/// Six binary checks, equally weighted: non-empty title, meta description,
/// canonical link, exactly one H1, no image missing `alt`, and a body of at
/// least 300 words. `score = passed / 6 * 100`.
fn score_signals(mut raw: serde_json::Value) -> serde_json::Value {
    let non_empty_str = |v: &serde_json::Value| v.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false);

    let has_title = raw.get("title").map(non_empty_str).unwrap_or(false);
    let has_description = raw.get("metaDescription").map(non_empty_str).unwrap_or(false);
    let has_canonical = raw.get("canonical").map(non_empty_str).unwrap_or(false);
    let exactly_one_h1 = raw
        .get("headings")
        .and_then(|h| h.get("h1"))
        .and_then(|h1| h1.as_array())
        .map(|arr| arr.len() == 1)
        .unwrap_or(false);
    let no_missing_alt = raw
        .get("imagesWithoutAlt")
        .and_then(|v| v.as_u64())
        .map(|n| n == 0)
        .unwrap_or(false);
    let sufficient_word_count = raw
        .get("wordCount")
        .and_then(|v| v.as_u64())
        .map(|n| n >= 300)
        .unwrap_or(false);

    let checks = [
        has_title,
        has_description,
        has_canonical,
        exactly_one_h1,
        no_missing_alt,
        sufficient_word_count,
    ];
    let passed = checks.iter().filter(|&&c| c).count();
    let score = passed as f64 / checks.len() as f64 * 100.0;

    if let Some(obj) = raw.as_object_mut() {
        obj.insert("score".to_string(), serde_json::json!(score));
        obj.insert(
            "details".to_string(),
            serde_json::json!({
                "hasTitle": has_title,
                "hasMetaDescription": has_description,
                "hasCanonical": has_canonical,
                "exactlyOneH1": exactly_one_h1,
                "noImagesMissingAlt": no_missing_alt,
                "sufficientWordCount": sufficient_word_count,
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
            "title": "A good title",
            "metaDescription": "A description",
            "canonical": "https://example.com/",
            "headings": {"h1": ["Only heading"]},
            "imagesWithoutAlt": 0,
            "wordCount": 400,
        });
        let scored = score_signals(raw);
        assert_eq!(scored["score"], serde_json::json!(100.0));
    }

    #[test]
    fn zero_marks_when_nothing_present() {
        let scored = score_signals(serde_json::json!({}));
        assert_eq!(scored["score"], serde_json::json!(0.0));
    }

    #[tokio::test]
    async fn skip_flag_yields_empty_fragment() {
        let session = ScriptedSession::new(HttpObservation::default());
        let mut ctx = PageContext::new("https://example.com".into(), Box::new(session));
        ctx.should_skip_rendering = true;

        SeoModule.run(&mut ctx).await;

        assert_eq!(ctx.fragment("seo"), Some(&ResultFragment::Ok(serde_json::json!({}))));
    }
}

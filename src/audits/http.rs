//! HTTP module: always runs first in the chain. The actual navigation
//! happens in the work queue (so a `NavigationTimeout`/`SessionCrash` can
//! drive the retry loop before the rest of the chain ever runs); this
//! module only formats the `HttpObservation` the queue already placed on
//! `ctx.http` and sets `ctx.should_skip_rendering` for a bad status.

use async_trait::async_trait;

use crate::audits::AuditModule;
use crate::page_context::{PageContext, ResultFragment};

pub struct HttpModule;

#[async_trait]
impl AuditModule for HttpModule {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self, ctx: &mut PageContext) {
        let fragment = match &ctx.http {
            Some(observation) => {
                ctx.should_skip_rendering = observation.status_code >= 400;
                ResultFragment::Ok(serde_json::json!({
                    "statusCode": observation.status_code,
                    "headers": observation.headers,
                    "finalUrl": observation.final_url,
                    "redirectChain": observation.redirect_chain,
                    "ttfbMs": observation.ttfb_ms,
                }))
            }
            None => {
                ctx.should_skip_rendering = true;
                ResultFragment::Error {
                    error: "no HTTP observation available".to_string(),
                }
            }
        };
        ctx.record(self.name(), fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::test_support::noop_session;
    use crate::page_context::HttpObservation;

    #[tokio::test]
    async fn records_observation_and_clears_skip_flag_on_2xx() {
        let mut ctx = PageContext::new("https://example.com".into(), noop_session());
        ctx.http = Some(HttpObservation {
            status_code: 200,
            final_url: "https://example.com".into(),
            ..Default::default()
        });

        HttpModule.run(&mut ctx).await;

        assert!(!ctx.should_skip_rendering);
        assert!(matches!(ctx.fragment("http"), Some(ResultFragment::Ok(_))));
    }

    #[tokio::test]
    async fn sets_skip_flag_on_4xx() {
        let mut ctx = PageContext::new("https://example.com/missing".into(), noop_session());
        ctx.http = Some(HttpObservation {
            status_code: 404,
            final_url: "https://example.com/missing".into(),
            ..Default::default()
        });

        HttpModule.run(&mut ctx).await;

        assert!(ctx.should_skip_rendering);
    }

    #[tokio::test]
    async fn missing_observation_skips_rendering_and_records_error() {
        let mut ctx = PageContext::new("https://example.com".into(), noop_session());

        HttpModule.run(&mut ctx).await;

        assert!(ctx.should_skip_rendering);
        assert!(matches!(ctx.fragment("http"), Some(ResultFragment::Error { .. })));
    }
}

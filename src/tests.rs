//! Cross-module integration tests. Per-module behavior already has thorough
//! unit coverage alongside each module; this file is reserved for scenarios
//! that span more than one of them — config validation short-circuiting
//! before a browser pool is ever launched, a full audit chain feeding the
//! artifact writer, and event-bus ordering across a simulated page run.
//! None of these launch a real browser: every page-level scenario here
//! drives `browser_pool::test_support::ScriptedSession` instead.

#[cfg(test)]
mod integration_tests {
    use crate::audits::build_chain;
    use crate::browser_pool::test_support::ScriptedSession;
    use crate::config::Config;
    use crate::error::AuditError;
    use crate::events::{Delivery, Event, EventBus, EventKind};
    use crate::page_context::{HttpObservation, PageContext};
    use crate::run::RunManager;
    use crate::{EnvOverrides, PageArtifact, RunPaths};

    /// `RunManager::start` validates the config before it resolves a URL
    /// list, launches a browser pool, or touches the filesystem; an invalid
    /// config (no sitemap, no direct URLs) must fail fast without any of
    /// that, so this is safe to assert without a real Chrome binary.
    #[tokio::test]
    async fn invalid_config_is_rejected_before_any_browser_launch() {
        let bus = EventBus::new();
        let runs = RunManager::new(bus, EnvOverrides::default());
        let config = Config {
            sitemap_url: None,
            urls: Vec::new(),
            ..Default::default()
        };

        let result = runs.start(config).await;
        assert!(result.is_err());
        assert_eq!(runs.active_runs(), 0);
    }

    /// Drives every module in the canonical chain against one scripted page,
    /// publishing the same attach/finish events the real worker loop does,
    /// then hands the finished context to the artifact writer and reads the
    /// result back from disk.
    #[tokio::test]
    async fn full_chain_feeds_artifact_writer_end_to_end() {
        let config = Config {
            enable_performance: true,
            enable_accessibility: true,
            enable_seo: true,
            enable_content_weight: true,
            enable_mobile: true,
            ..Default::default()
        };
        let chain = build_chain(&config);
        assert_eq!(chain.len(), 6, "http plus all five optional modules");

        let http = HttpObservation {
            status_code: 200,
            final_url: "https://example.com/".into(),
            ttfb_ms: 42,
            ..Default::default()
        };
        // Every module but `http` calls `evaluate()` exactly once; queue one
        // error result per module so the chain exercises the per-module
        // error-fragment path uniformly without depending on any one
        // module's specific success JSON shape.
        let module_error = |module: &str| AuditError::ModuleError {
            module: module.to_string(),
            reason: "no cdp".to_string(),
        };
        let session = ScriptedSession::new(http)
            .push_eval_error(module_error("performance"))
            .push_eval_error(module_error("accessibility"))
            .push_eval_error(module_error("seo"))
            .push_eval_error(module_error("content_weight"))
            .push_eval_error(module_error("mobile"));

        let mut ctx = PageContext::new("https://example.com/".into(), Box::new(session));
        ctx.http = Some(ctx.session.navigate("https://example.com/", std::time::Duration::from_secs(1)).await.unwrap());

        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe();
        let run_id = "run-test-0001";

        for module in &chain {
            bus.publish(Event::new(run_id, Some(ctx.url.clone()), EventKind::AuditAttached { module: module.name().to_string() }));
            module.run(&mut ctx).await;
            bus.publish(Event::new(run_id, Some(ctx.url.clone()), EventKind::AuditFinished { module: module.name().to_string() }));
        }
        ctx.finish();

        // Every module attached and finished in canonical order.
        let mut seen = Vec::new();
        while let Ok(delivery) = rx.try_recv() {
            if let Delivery::Event(event) = delivery {
                match event.kind {
                    EventKind::AuditAttached { module } => seen.push(format!("attach:{module}")),
                    EventKind::AuditFinished { module } => seen.push(format!("finish:{module}")),
                    _ => {}
                }
            }
        }
        assert_eq!(
            seen,
            vec![
                "attach:http", "finish:http",
                "attach:performance", "finish:performance",
                "attach:accessibility", "finish:accessibility",
                "attach:seo", "finish:seo",
                "attach:content_weight", "finish:content_weight",
                "attach:mobile", "finish:mobile",
            ]
        );

        let artifact = PageArtifact::from_context(run_id, &ctx);
        assert_eq!(artifact.http.status_code, 200);
        for fragment in [&artifact.perf, &artifact.a11y, &artifact.seo, &artifact.content_weight, &artifact.mobile] {
            let value = fragment.as_ref().expect("every enabled module records a fragment");
            assert!(value.get("error").is_some(), "scripted failures surface as error fragments");
        }

        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path().to_str().unwrap(), run_id);
        paths.ensure_dirs().await.unwrap();
        crate::artifact::write_page_artifact(&paths, &artifact).await.unwrap();

        let written = tokio::fs::read_to_string(paths.page_path(&artifact.url)).await.unwrap();
        let roundtripped: PageArtifact = serde_json::from_str(&written).unwrap();
        assert_eq!(roundtripped.url, artifact.url);
        assert_eq!(roundtripped.run_id, run_id);
        assert!(roundtripped.seo.unwrap().get("error").is_some());
    }
}

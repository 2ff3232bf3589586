//! The audit chain: an ordered, config-selected list of analyzers sharing
//! one `PageContext` per page.
//!
//! Grounded on how the teacher composes `BrowserPool` + `CircuitBreaker` +
//! retry config as independent, separately-testable collaborators rather
//! than a class hierarchy — here, a flat `Vec<Box<dyn AuditModule>>` plays
//! the same role for the six analyzers.

pub mod accessibility;
pub mod content_weight;
pub mod http;
pub mod mobile;
pub mod performance;
pub mod seo;

use async_trait::async_trait;

use crate::config::Config;
use crate::page_context::PageContext;

/// One analyzer in the chain. `run` is responsible for recording its own
/// result into `ctx` via `ctx.record(self.name(), ...)` — callers only need
/// to invoke `run` in order and publish the attach/finish events around it.
#[async_trait]
pub trait AuditModule: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut PageContext);
}

/// Assembles the active chain for one run: HTTP always runs first and is
/// never disabled; the rest are included per the config's enable flags, in
/// the canonical order HTTP → Performance → Accessibility → SEO →
/// ContentWeight → Mobile.
pub fn build_chain(config: &Config) -> Vec<Box<dyn AuditModule>> {
    let mut chain: Vec<Box<dyn AuditModule>> = vec![Box::new(http::HttpModule)];

    if config.enable_performance {
        chain.push(Box::new(performance::PerformanceModule {
            budget: config.performance_budget,
        }));
    }
    if config.enable_accessibility {
        chain.push(Box::new(accessibility::AccessibilityModule::new(
            config.accessibility_analyzer_path.clone(),
        )));
    }
    if config.enable_seo {
        chain.push(Box::new(seo::SeoModule));
    }
    if config.enable_content_weight {
        chain.push(Box::new(content_weight::ContentWeightModule));
    }
    if config.enable_mobile {
        chain.push(Box::new(mobile::MobileModule));
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_always_starts_with_http_regardless_of_flags() {
        let config = Config {
            enable_performance: false,
            enable_seo: false,
            enable_content_weight: false,
            enable_mobile: false,
            enable_accessibility: false,
            ..Default::default()
        };
        let chain = build_chain(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "http");
    }

    #[test]
    fn chain_includes_every_module_in_canonical_order_when_all_enabled() {
        let config = Config::default();
        let chain = build_chain(&config);
        let names: Vec<&str> = chain.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["http", "performance", "accessibility", "seo", "content_weight", "mobile"]
        );
    }
}

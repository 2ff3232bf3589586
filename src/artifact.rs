//! Artifact writer: serializes one page's results (or a run summary) and
//! writes it atomically — temp file in the same directory, then rename.
//!
//! Grounded on the teacher's `tokio::fs::write` calls in `cli.rs`'s
//! `run_batch`/`run_single`, generalized to write-to-sibling-temp-then-rename
//! so a crash mid-write never leaves a half-written artifact visible under
//! its final name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};
use crate::page_context::{HttpObservation, PageContext, ResultFragment};

pub const SCHEMA_VERSION: &str = "1";

/// The terminal-failure record for a URL that never finished the chain:
/// `code` is `AuditError::code()`, `message` its `Display` text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageArtifact {
    pub schema_version: String,
    pub run_id: String,
    pub url: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub http: HttpObservation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perf: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a11y: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_weight: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub console_errors: Vec<String>,
    pub screenshot_path: Option<String>,
}

impl PageArtifact {
    /// Builds an artifact from a finished `PageContext`. Module fragments
    /// that failed are still captured (as `{"error": "..."}` blobs) so a
    /// reader can see a per-module error instead of just a missing field.
    pub fn from_context(run_id: &str, ctx: &PageContext) -> Self {
        let fragment_json = |name: &str| -> Option<serde_json::Value> {
            ctx.fragment(name).map(|f| match f {
                ResultFragment::Ok(value) => value.clone(),
                ResultFragment::Error { error } => serde_json::json!({ "error": error }),
            })
        };

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            url: ctx.url.clone(),
            started_at: ctx.started_at,
            finished_at: ctx.finished_at.unwrap_or_else(chrono::Utc::now),
            http: ctx.http.clone().unwrap_or_default(),
            perf: fragment_json("performance"),
            a11y: fragment_json("accessibility"),
            seo: fragment_json("seo"),
            content_weight: fragment_json("content_weight"),
            mobile: fragment_json("mobile"),
            error: None,
            console_errors: ctx.console_errors.clone(),
            screenshot_path: ctx.screenshot_path.clone(),
        }
    }

    /// Builds a terminal error-stub artifact for a URL that never produced a
    /// full `PageContext` (exhausted retries, terminal 4xx/3xx-unfollowed, a
    /// fatal session-acquire failure, ...). `http` carries the last observed
    /// response when one exists, per spec.md's "artifact still written with
    /// HTTP data" rule for terminal HTTP errors.
    pub fn error_stub(
        run_id: &str,
        url: &str,
        http: Option<HttpObservation>,
        error: &AuditError,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            url: url.to_string(),
            started_at,
            finished_at: chrono::Utc::now(),
            http: http.unwrap_or_default(),
            perf: None,
            a11y: None,
            seo: None,
            content_weight: None,
            mobile: None,
            error: Some(ErrorInfo {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
            console_errors: Vec::new(),
            screenshot_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageStatus {
    Finished,
    Errored,
    Skipped,
    Redirected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub total_urls: usize,
    pub status_counts: HashMap<String, usize>,
    pub module_average_scores: HashMap<String, f64>,
}

impl RunSummary {
    pub fn build(
        run_id: &str,
        started_at: chrono::DateTime<chrono::Utc>,
        statuses: &[PageStatus],
        module_scores: &HashMap<String, Vec<f64>>,
    ) -> Self {
        let mut status_counts = HashMap::new();
        for status in statuses {
            let key = match status {
                PageStatus::Finished => "finished",
                PageStatus::Errored => "errored",
                PageStatus::Skipped => "skipped",
                PageStatus::Redirected => "redirected",
            };
            *status_counts.entry(key.to_string()).or_insert(0) += 1;
        }

        let module_average_scores = module_scores
            .iter()
            .filter(|(_, scores)| !scores.is_empty())
            .map(|(module, scores)| {
                let avg = scores.iter().sum::<f64>() / scores.len() as f64;
                (module.clone(), avg)
            })
            .collect();

        Self {
            run_id: run_id.to_string(),
            started_at,
            finished_at: chrono::Utc::now(),
            total_urls: statuses.len(),
            status_counts,
            module_average_scores,
        }
    }
}

/// `urlSlug` per spec: the URL with every non-alphanumeric character
/// replaced by `_` (no further collapsing or trimming).
fn url_slug(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Directory layout owned by one run: `<outputDir>/<runId>/{pages,screenshots,summary.json}`.
pub struct RunPaths {
    pub root: PathBuf,
}

impl RunPaths {
    pub fn new(output_dir: &str, run_id: &str) -> Self {
        Self {
            root: Path::new(output_dir).join(run_id),
        }
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    pub fn page_path(&self, url: &str) -> PathBuf {
        self.pages_dir().join(format!("{}.json", url_slug(url)))
    }

    pub fn screenshot_path(&self, url: &str) -> PathBuf {
        self.screenshots_dir().join(format!("{}.png", url_slug(url)))
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.pages_dir()).await?;
        tokio::fs::create_dir_all(self.screenshots_dir()).await?;
        Ok(())
    }
}

/// Writes `value` as pretty JSON to `path` atomically: serialize to a
/// sibling `.tmp` file, fsync it, then rename over the destination.
pub async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    use tokio::io::AsyncWriteExt;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn write_page_artifact(paths: &RunPaths, artifact: &PageArtifact) -> Result<()> {
    write_atomic(&paths.page_path(&artifact.url), artifact).await
}

pub async fn write_screenshot(paths: &RunPaths, url: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = paths.screenshot_path(url);
    let tmp_path = path.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, &path).await?;
    Ok(path)
}

pub async fn write_summary(paths: &RunPaths, summary: &RunSummary) -> Result<()> {
    write_atomic(&paths.summary_path(), summary).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::test_support::noop_session;

    #[test]
    fn slug_replaces_every_non_alphanumeric_char() {
        assert_eq!(
            url_slug("https://example.com/a/b?x=1"),
            "https___example_com_a_b_x_1"
        );
        assert_eq!(url_slug("http://example.com"), "http___example_com");
    }

    #[test]
    fn artifact_from_context_captures_module_errors() {
        let mut ctx = PageContext::new("https://example.com".into(), noop_session());
        ctx.record(
            "performance",
            ResultFragment::Error {
                error: "navigation timeout".into(),
            },
        );
        ctx.finish();

        let artifact = PageArtifact::from_context("run-1", &ctx);
        assert_eq!(
            artifact.perf.unwrap()["error"],
            serde_json::json!("navigation timeout")
        );
        assert!(artifact.seo.is_none());
    }

    #[test]
    fn run_summary_averages_module_scores() {
        let mut scores = HashMap::new();
        scores.insert("seo".to_string(), vec![80.0, 90.0, 100.0]);
        let summary = RunSummary::build(
            "run-1",
            chrono::Utc::now(),
            &[PageStatus::Finished, PageStatus::Errored],
            &scores,
        );
        assert_eq!(summary.total_urls, 2);
        assert_eq!(summary.status_counts["finished"], 1);
        assert_eq!(summary.status_counts["errored"], 1);
        assert_eq!(summary.module_average_scores["seo"], 90.0);
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_tmp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let value = serde_json::json!({"ok": true});

        write_atomic(&path, &value).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
        let read_back: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(read_back, value);
    }

    #[tokio::test]
    async fn run_paths_lay_out_the_expected_tree() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path().to_str().unwrap(), "run-1");
        paths.ensure_dirs().await.unwrap();

        assert!(paths.pages_dir().exists());
        assert!(paths.screenshots_dir().exists());
        assert_eq!(
            paths.page_path("https://example.com/a"),
            paths.pages_dir().join("https___example_com_a.json")
        );
    }
}

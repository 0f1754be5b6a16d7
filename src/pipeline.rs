//! # Extraction Pipeline
//!
//! Wires the pieces of a run together: load the work list, launch a browser,
//! sign in, walk every item through the extraction loop and close the browser
//! on every path once the session exists.
//!
//! ## Key Components
//!
//! - `Pipeline`: one end-to-end run over an input file
//! - `ExtractionLoop`: the per-item state machine executor
//! - `RunSummary`: counts and outcome reported back to the caller

mod extraction_loop;
pub mod machine;

pub use extraction_loop::{ExtractionLoop, LoopReport};

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::auth::{self, Credentials};
use crate::config::PipelineConfig;
use crate::driver::{DriverError, PageDriver};
use crate::error::Result;
use crate::input;
use crate::policy::FailurePolicy;
use crate::sink::ResultSink;
use crate::surface::Surface;

/// How a run ended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every item was attempted
    #[default]
    Completed,
    /// The run stopped early at the given item
    Aborted {
        index: usize,
        url: String,
        reason: String,
    },
}

/// Report of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Non-blank lines in the input
    pub total: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retried: usize,
    pub persist_failures: usize,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn from_report(total: usize, report: LoopReport, started_at: DateTime<Utc>) -> Self {
        Self {
            total,
            extracted: report.extracted,
            skipped: report.skipped,
            failed: report.failed,
            retried: report.retried,
            persist_failures: report.persist_failures,
            outcome: report.outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted { .. })
    }

    /// Items neither extracted nor given up on before the run ended
    pub fn unattempted(&self) -> usize {
        self.total
            .saturating_sub(self.extracted + self.skipped + self.failed)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// One end-to-end extraction run
#[derive(Debug, Clone)]
pub struct Pipeline {
    surface: Surface,
    config: PipelineConfig,
    policy: FailurePolicy,
    progress: ProgressBar,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            surface: Surface::default(),
            config,
            policy: FailurePolicy::default(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Report per-item progress on `progress`; its length is set from the input
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every item in `input` through a browser produced by `launch`.
    ///
    /// A quota abort is a successful return with [`RunOutcome::Aborted`];
    /// errors are reserved for conditions that prevent the run from working
    /// at all.
    #[instrument(skip_all, fields(input = %input.as_ref().display(), site = %credentials.target_site()))]
    pub async fn run<D, F, Fut>(
        &self,
        input: impl AsRef<Path>,
        credentials: &Credentials,
        launch: F,
    ) -> Result<RunSummary>
    where
        D: PageDriver,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<D, DriverError>>,
    {
        let started_at = Utc::now();
        let items = input::load(input.as_ref()).await?;
        let total = items.len();

        if items.is_empty() {
            warn!("Input has no URLs, nothing to inspect");
            return Ok(RunSummary::from_report(0, LoopReport::default(), started_at));
        }
        self.progress.set_length(total as u64);

        let driver = launch().await?;
        let mut session = auth::authenticate(driver, credentials, &self.surface, &self.config).await?;

        let mut sink = ResultSink::new(&self.config.json_path, &self.config.csv_path);
        // Outputs belong to this run from the start, even if nothing is extracted.
        if let Err(e) = sink.persist().await {
            warn!("Failed to reset result files: {}", e);
        }
        let extraction = ExtractionLoop::new(self.surface.clone(), self.config.clone())
            .with_progress(self.progress.clone());
        let report = extraction
            .run(items, &mut session, &mut sink, &self.policy)
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser: {}", e);
        }
        self.progress.finish_and_clear();

        let summary = RunSummary::from_report(total, report?, started_at);
        info!(
            total = summary.total,
            extracted = summary.extracted,
            skipped = summary.skipped,
            failed = summary.failed,
            aborted = summary.is_aborted(),
            "Run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::config::PipelineConfigBuilder;
    use crate::driver::{DriverCall, MockDriver, MockPage};
    use crate::policy::ExtractionFailure;
    use crate::record::ExtractionResult;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        input: PathBuf,
        surface: Surface,
        policy: FailurePolicy,
    }

    impl Fixture {
        fn new(lines: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let input = dir.path().join("urls.txt");
            std::fs::write(&input, lines).unwrap();
            Self {
                dir,
                input,
                surface: Surface::default(),
                policy: FailurePolicy::default(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn pipeline(&self) -> Pipeline {
            self.pipeline_with(PipelineConfig::immediate())
        }

        fn pipeline_with(&self, builder: PipelineConfigBuilder) -> Pipeline {
            let config = builder
                .json_path(self.path("results.json"))
                .csv_path(self.path("results.csv"))
                .snapshot_path(self.path("quota.png"))
                .build();
            Pipeline::new(config)
                .with_surface(self.surface.clone())
                .with_policy(self.policy.clone())
        }

        fn marker(&self, name: &str) -> String {
            self.policy
                .rules()
                .iter()
                .find(|rule| rule.name == name)
                .map(|rule| rule.selector.clone())
                .unwrap()
        }

        fn marked_page(&self, name: &str) -> MockPage {
            MockPage::landing(&self.surface).with_marker(self.marker(name))
        }

        async fn driver(&self, pages: Vec<(&str, MockPage)>) -> MockDriver {
            let driver = MockDriver::for_surface(&self.surface);
            for (url, page) in pages {
                driver.set_query_page(url, page).await;
            }
            driver
        }

        async fn run(&self, driver: MockDriver) -> Result<RunSummary> {
            let credentials = Credentials::new("ops@example.com", "hunter2", "https://example.com/");
            self.pipeline()
                .run(&self.input, &credentials, move || async move { Ok::<_, DriverError>(driver) })
                .await
        }

        fn persisted(&self) -> Vec<ExtractionResult> {
            let json = std::fs::read_to_string(self.path("results.json")).unwrap();
            serde_json::from_str(&json).unwrap()
        }

        fn persisted_urls(&self) -> Vec<String> {
            self.persisted().iter().map(|r| r.url().to_string()).collect()
        }
    }

    fn typed_queries(calls: &[DriverCall], query_input: &str) -> Vec<String> {
        calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Type { selector, text } if selector == query_input => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    const URLS: [&str; 5] = [
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/c",
        "https://example.com/d",
        "https://example.com/e",
    ];

    #[tokio::test]
    async fn test_quota_stops_run_and_keeps_earlier_results() {
        let fx = Fixture::new(&URLS.join("\n"));
        let mut pages: Vec<(&str, MockPage)> = URLS
            .iter()
            .map(|url| (*url, MockPage::indexed(&fx.surface, url)))
            .collect();
        pages[2].1 = fx.marked_page("quota-exceeded");
        let driver = fx.driver(pages).await;
        let recorder = driver.clone();

        let summary = fx.run(driver).await.unwrap();

        assert!(summary.is_aborted());
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.unattempted(), 3);
        match &summary.outcome {
            RunOutcome::Aborted { index, url, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(url, URLS[2]);
            }
            RunOutcome::Completed => panic!("Expected abort"),
        }
        assert_eq!(fx.persisted_urls(), vec![URLS[0], URLS[1]]);

        let calls = recorder.calls().await;
        assert_eq!(
            typed_queries(&calls, &fx.surface.query.input),
            vec![URLS[0], URLS[1], URLS[2]]
        );
        assert_eq!(
            recorder
                .count_calls(|c| *c == DriverCall::Screenshot(fx.path("quota.png")))
                .await,
            1
        );
        assert_eq!(recorder.count_calls(|c| *c == DriverCall::Close).await, 1);
    }

    #[tokio::test]
    async fn test_not_applicable_item_is_skipped() {
        let fx = Fixture::new(&URLS[..3].join("\n"));
        let driver = fx
            .driver(vec![
                (URLS[0], MockPage::indexed(&fx.surface, URLS[0])),
                (URLS[1], fx.marked_page("not-in-property")),
                (URLS[2], MockPage::indexed(&fx.surface, URLS[2])),
            ])
            .await;
        let recorder = driver.clone();

        let summary = fx.run(driver).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!((summary.extracted, summary.skipped), (2, 1));
        assert_eq!(fx.persisted_urls(), vec![URLS[0], URLS[2]]);
        assert_eq!(
            recorder
                .count_calls(|c| matches!(c, DriverCall::Screenshot(_)))
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_carriage_returns_are_stripped_from_records() {
        let fx = Fixture::new("https://example.com/a\r\n\r\nhttps://example.com/b\r\n");
        let driver = fx
            .driver(vec![
                (URLS[0], MockPage::indexed(&fx.surface, URLS[0])),
                (URLS[1], MockPage::indexed(&fx.surface, "https://example.com/other")),
            ])
            .await;

        let summary = fx.run(driver).await.unwrap();
        assert_eq!(summary.total, 2);

        let persisted = fx.persisted();
        assert_eq!(persisted[0].url(), URLS[0]);
        assert_eq!(persisted[1].url(), URLS[1]);
        let csv = std::fs::read_to_string(fx.path("results.csv")).unwrap();
        assert!(csv.lines().all(|line| !line.contains('\r')));
        assert!(!std::fs::read_to_string(fx.path("results.json")).unwrap().contains("\\r"));
    }

    #[tokio::test]
    async fn test_self_canonical_is_written_as_the_url() {
        let fx = Fixture::new(URLS[0]);
        let driver = fx
            .driver(vec![(URLS[0], MockPage::indexed(&fx.surface, URLS[0]))])
            .await;

        fx.run(driver).await.unwrap();

        let persisted = fx.persisted();
        assert_eq!(
            persisted[0].get("Google-canonical").and_then(|v| v.as_text().map(String::from)),
            Some(URLS[0].to_string())
        );
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_then_skipped() {
        let mut fx = Fixture::new(&URLS[..2].join("\n"));
        fx.policy = FailurePolicy::default().with_max_transient_retries(2);
        let driver = fx
            .driver(vec![
                (URLS[0], fx.marked_page("service-error")),
                (URLS[1], MockPage::indexed(&fx.surface, URLS[1])),
            ])
            .await;
        let recorder = driver.clone();

        let summary = fx.run(driver).await.unwrap();

        assert_eq!((summary.retried, summary.skipped, summary.extracted), (2, 1, 1));
        let typed = typed_queries(&recorder.calls().await, &fx.surface.query.input);
        assert_eq!(typed, vec![URLS[0], URLS[0], URLS[0], URLS[1]]);
    }

    #[tokio::test]
    async fn test_read_failure_skips_item_by_default() {
        let fx = Fixture::new(&URLS[..2].join("\n"));
        let broken = MockPage::indexed(&fx.surface, URLS[0])
            .with_broken(&fx.surface.results.primary[0].selector);
        let driver = fx
            .driver(vec![
                (URLS[0], broken),
                (URLS[1], MockPage::indexed(&fx.surface, URLS[1])),
            ])
            .await;

        let summary = fx.run(driver).await.unwrap();

        assert_eq!((summary.failed, summary.extracted), (1, 1));
        assert_eq!(fx.persisted_urls(), vec![URLS[1]]);
    }

    #[tokio::test]
    async fn test_strict_policy_returns_error_and_closes_browser() {
        let mut fx = Fixture::new(&URLS[..3].join("\n"));
        fx.policy = FailurePolicy::default().with_extraction_failure(ExtractionFailure::Abort);
        let broken = MockPage::indexed(&fx.surface, URLS[1])
            .with_broken(&fx.surface.results.primary[0].selector);
        let driver = fx
            .driver(vec![
                (URLS[0], MockPage::indexed(&fx.surface, URLS[0])),
                (URLS[1], broken),
                (URLS[2], MockPage::indexed(&fx.surface, URLS[2])),
            ])
            .await;
        let recorder = driver.clone();

        let result = fx.run(driver).await;

        assert!(matches!(result, Err(Error::Extract(_))));
        assert_eq!(fx.persisted_urls(), vec![URLS[0]]);
        assert_eq!(recorder.count_calls(|c| *c == DriverCall::Close).await, 1);
        assert_eq!(
            recorder
                .count_calls(|c| matches!(c, DriverCall::Screenshot(_)))
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_failed_snapshot_does_not_fail_the_run() {
        let fx = Fixture::new(URLS[0]);
        let driver = fx.driver(vec![(URLS[0], fx.marked_page("quota-exceeded"))]).await;
        driver.fail_screenshots().await;

        let summary = fx.run(driver).await.unwrap();
        assert!(summary.is_aborted());
        assert_eq!(summary.extracted, 0);
    }

    #[tokio::test]
    async fn test_login_failure_is_fatal() {
        let fx = Fixture::new(URLS[0]);
        let driver = MockDriver::new(MockPage::new(), fx.surface.query.input.clone());
        let recorder = driver.clone();

        let result = fx.run(driver).await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(recorder.count_calls(|c| *c == DriverCall::Close).await, 1);
        assert!(!fx.path("results.json").exists());
    }

    #[tokio::test]
    async fn test_empty_input_never_launches_browser() {
        let fx = Fixture::new("\n  \n");
        let credentials = Credentials::new("ops@example.com", "hunter2", "https://example.com/");

        let summary = fx
            .pipeline()
            .run(&fx.input, &credentials, || async {
                Err::<MockDriver, _>(DriverError::Launch("should not launch".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(summary.total, 0);
        assert_eq!(summary.outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_missing_input_is_fatal() {
        let fx = Fixture::new("");
        std::fs::remove_file(&fx.input).unwrap();

        let result = fx.run(MockDriver::for_surface(&fx.surface)).await;
        assert!(matches!(result, Err(Error::Input(_))));
    }
    #[tokio::test]
    async fn test_run_without_results_replaces_previous_outputs() {
        let fx = Fixture::new(URLS[0]);
        std::fs::write(fx.path("results.json"), r#"[{"URL":"https://stale.example/"}]"#).unwrap();
        std::fs::write(fx.path("results.csv"), "URL\nhttps://stale.example/\n").unwrap();
        let driver = fx.driver(vec![(URLS[0], fx.marked_page("quota-exceeded"))]).await;

        let summary = fx.run(driver).await.unwrap();

        assert!(summary.is_aborted());
        assert_eq!(summary.extracted, 0);
        assert_eq!(std::fs::read_to_string(fx.path("results.json")).unwrap(), "[]");
        assert!(std::fs::read_to_string(fx.path("results.csv")).unwrap().is_empty());
    }

    /// Turn the JSON output path into a directory so the rename onto it fails
    fn block_path(path: PathBuf) -> impl FnOnce() + Send + 'static {
        move || {
            let _ = std::fs::remove_file(&path);
            std::fs::create_dir(&path).unwrap();
        }
    }

    fn unblock_path(path: PathBuf) -> impl FnOnce() + Send + 'static {
        move || std::fs::remove_dir(&path).unwrap()
    }

    #[tokio::test]
    async fn test_failed_write_is_recovered_by_next_append() {
        let fx = Fixture::new(&URLS[..2].join("\n"));
        let driver = fx
            .driver(vec![
                (URLS[0], MockPage::indexed(&fx.surface, URLS[0])),
                (URLS[1], MockPage::indexed(&fx.surface, URLS[1])),
            ])
            .await;
        driver.on_query(URLS[0], block_path(fx.path("results.json"))).await;
        driver.on_query(URLS[1], unblock_path(fx.path("results.json"))).await;

        let summary = fx.run(driver).await.unwrap();

        assert_eq!(summary.persist_failures, 1);
        assert_eq!(summary.extracted, 2);
        assert_eq!(fx.persisted_urls(), vec![URLS[0], URLS[1]]);
        assert!(!fx.path("results.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_last_write_is_flushed_when_loop_ends() {
        let fx = Fixture::new(&URLS[..2].join("\n"));
        let driver = fx
            .driver(vec![
                (URLS[0], MockPage::indexed(&fx.surface, URLS[0])),
                (URLS[1], fx.marked_page("not-in-property")),
            ])
            .await;
        driver.on_query(URLS[0], block_path(fx.path("results.json"))).await;
        driver.on_query(URLS[1], unblock_path(fx.path("results.json"))).await;

        let summary = fx.run(driver).await.unwrap();

        assert_eq!(summary.persist_failures, 1);
        assert_eq!((summary.extracted, summary.skipped), (1, 1));
        assert_eq!(fx.persisted_urls(), vec![URLS[0]]);
    }

    #[tokio::test]
    async fn test_rate_limited_run_completes_within_burst() {
        let fx = Fixture::new(&URLS[..3].join("\n"));
        let driver = fx
            .driver(
                URLS[..3]
                    .iter()
                    .map(|url| (*url, MockPage::indexed(&fx.surface, url)))
                    .collect(),
            )
            .await;
        let pipeline = fx.pipeline_with(PipelineConfig::immediate().rate_limit_per_minute(600));
        assert!(pipeline.config().rate_limiter().is_some());
        let credentials = Credentials::new("ops@example.com", "hunter2", "https://example.com/");

        let summary = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            pipeline.run(&fx.input, &credentials, move || async move {
                Ok::<_, DriverError>(driver)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(summary.extracted, 3);
        assert_eq!(fx.persisted_urls(), URLS[..3].to_vec());
    }
}

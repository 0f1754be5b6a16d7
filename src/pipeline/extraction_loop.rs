//! Runs the loop states against a live session.

use governor::DefaultDirectRateLimiter;
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{Instrument, debug, debug_span, error, info, instrument, warn};

use super::RunOutcome;
use super::machine::{self, AbortReason, LoopState, SkipReason};
use crate::auth::Session;
use crate::config::PipelineConfig;
use crate::driver::PageDriver;
use crate::error::Result;
use crate::extractor::{self, ExtractError};
use crate::input::WorkItem;
use crate::policy::{FailurePolicy, PageClassification};
use crate::sink::ResultSink;
use crate::surface::Surface;

/// Counts gathered over one loop run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    pub extracted: usize,
    /// Items skipped because of a page marker
    pub skipped: usize,
    /// Items skipped because navigation or a field read failed
    pub failed: usize,
    pub retried: usize,
    pub persist_failures: usize,
    pub outcome: RunOutcome,
}

/// Sequential extraction over one authenticated session
pub struct ExtractionLoop {
    surface: Surface,
    config: PipelineConfig,
    limiter: Option<DefaultDirectRateLimiter>,
    progress: ProgressBar,
}

impl ExtractionLoop {
    pub fn new(surface: Surface, config: PipelineConfig) -> Self {
        let limiter = config.rate_limiter();
        Self {
            surface,
            config,
            limiter,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `progress` once per finished item
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Process every item in order until the input is exhausted or the run aborts.
    ///
    /// Returns an error only when extraction failures are configured to abort.
    #[instrument(name = "extraction_loop", skip_all, fields(items = items.len(), site = %session.target_site()))]
    pub async fn run<D: PageDriver>(
        &self,
        items: Vec<WorkItem>,
        session: &mut Session<D>,
        sink: &mut ResultSink,
        policy: &FailurePolicy,
    ) -> Result<LoopReport> {
        let site = session.target_site().to_string();
        let driver = session.driver();
        let mut queue = items.into_iter();
        let mut report = LoopReport::default();
        let mut fatal: Option<ExtractError> = None;
        let mut unsaved = false;
        let mut state = LoopState::Idle;

        while !state.is_stopped() {
            state = match state {
                LoopState::Idle => machine::idle(queue.next()),

                LoopState::Navigating { item, attempt } => {
                    if attempt > 0 {
                        report.retried += 1;
                        info!(index = item.index(), url = %item.normalized(), attempt, "Retrying item");
                    }
                    let outcome = self.navigate(driver, &site, &item).await;
                    machine::navigated(item, attempt, outcome, policy)
                }

                LoopState::Classifying { item, attempt } => {
                    let outcome = policy.classify(driver).await.map_err(ExtractError::from);
                    if let Ok(classified) = &outcome {
                        debug!(
                            index = item.index(),
                            classification = %classified.classification,
                            "Page classified"
                        );
                    }
                    machine::classified(item, attempt, outcome, policy)
                }

                LoopState::Extracting { item } => {
                    let outcome =
                        extractor::extract(driver, &self.surface, &self.config, &item).await;
                    let (next, record) = machine::extracted(item, outcome, policy);
                    if let Some(result) = record {
                        report.extracted += 1;
                        info!(url = %result.url(), "Extracted");
                        match sink.append(result).await {
                            Ok(()) => unsaved = false,
                            Err(e) => {
                                report.persist_failures += 1;
                                unsaved = true;
                                warn!("Failed to persist results, will retry on next write: {}", e);
                            }
                        }
                        self.progress.inc(1);
                    }
                    next
                }

                LoopState::Skipping { item, reason } => {
                    match &reason {
                        SkipReason::Classified {
                            classification,
                            marker,
                        } => {
                            report.skipped += 1;
                            warn!(
                                index = item.index(),
                                url = %item.normalized(),
                                marker = marker.as_deref().unwrap_or("-"),
                                "Skipping item: {}",
                                skip_explanation(*classification)
                            );
                        }
                        SkipReason::Failed(e) => {
                            report.failed += 1;
                            warn!(
                                index = item.index(),
                                url = %item.normalized(),
                                "Skipping item after failure: {}", e
                            );
                        }
                    }
                    self.progress.inc(1);
                    machine::skipped()
                }

                LoopState::Aborting { item, reason } => {
                    let explanation = match reason {
                        AbortReason::Classified {
                            classification,
                            marker,
                        } => {
                            let explanation = abort_explanation(classification);
                            error!(
                                index = item.index(),
                                url = %item.normalized(),
                                marker = marker.as_deref().unwrap_or("-"),
                                "Stopping run: {}",
                                explanation
                            );
                            self.capture_snapshot(driver).await;
                            explanation.to_string()
                        }
                        AbortReason::Failed(e) => {
                            error!(
                                index = item.index(),
                                url = %item.normalized(),
                                "Stopping run after extraction failure: {}", e
                            );
                            let explanation = e.to_string();
                            fatal = Some(e);
                            explanation
                        }
                    };
                    report.outcome = RunOutcome::Aborted {
                        index: item.index(),
                        url: item.normalized(),
                        reason: explanation,
                    };
                    machine::aborted()
                }

                LoopState::Stopped => LoopState::Stopped,
            };
        }

        if unsaved {
            if let Err(e) = sink.persist().await {
                error!("Final write of results failed: {}", e);
            }
        }

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    async fn navigate<D>(
        &self,
        driver: &mut D,
        site: &str,
        item: &WorkItem,
    ) -> std::result::Result<(), ExtractError>
    where
        D: PageDriver + ?Sized,
    {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().instrument(debug_span!("limiter")).await;
        }

        let query = &self.surface.query;
        driver.goto(&self.surface.inspect_url(site)).await?;
        driver
            .wait_for_selector(&query.input, self.config.default_timeout)
            .await?;
        driver.click(&query.input).await?;
        driver
            .type_text(&query.input, &item.normalized(), self.config.typing_delay)
            .await?;
        if let Some(key) = &query.submit_key {
            driver.press(key).await?;
        }

        // The quota banner has no counterpart to wait on, so give it time to render.
        if !self.config.quota_settle.is_zero() {
            tokio::time::sleep(self.config.quota_settle).await;
        }
        Ok(())
    }

    async fn capture_snapshot<D>(&self, driver: &mut D)
    where
        D: PageDriver + ?Sized,
    {
        let path = &self.config.snapshot_path;
        match driver.screenshot(path, true).await {
            Ok(()) => info!(path = %path.display(), "Saved diagnostic screenshot"),
            Err(e) => warn!(path = %path.display(), "Failed to save diagnostic screenshot: {}", e),
        }
    }
}

fn skip_explanation(classification: PageClassification) -> &'static str {
    match classification {
        PageClassification::TransientError => {
            "the service reported an error for this URL, re-run it later"
        }
        PageClassification::ItemNotApplicable => "the URL is not part of the inspected property",
        _ => "the page is not in an inspectable state",
    }
}

fn abort_explanation(classification: PageClassification) -> &'static str {
    match classification {
        PageClassification::QuotaExceeded => {
            "the daily URL inspection quota is exhausted; results so far are saved"
        }
        PageClassification::SecondFactorRequired => {
            "the session asked for a second factor again and needs an operator"
        }
        _ => "the page reported a condition that ends the run",
    }
}

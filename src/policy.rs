//! # Failure Policy
//!
//! Page classification is a table of `(selector, classification)` rules checked
//! in priority order; the first present marker wins and an empty match means
//! the page is ready. What the loop does with each classification is decided
//! by [`FailurePolicy::dispose`], so adding a marker is a data change.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::driver::{DriverError, PageDriver};

/// State of a just-navigated page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageClassification {
    /// The result UI is interactable
    Ready,
    /// Inspection quota used up; nothing else can run
    QuotaExceeded,
    /// The service reported a generic error for this item
    TransientError,
    /// The URL does not belong to the inspected site
    ItemNotApplicable,
    /// The session is waiting on a second factor
    SecondFactorRequired,
}

impl fmt::Display for PageClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::QuotaExceeded => "quota exceeded",
            Self::TransientError => "transient error",
            Self::ItemNotApplicable => "not applicable",
            Self::SecondFactorRequired => "second factor required",
        };
        f.write_str(name)
    }
}

/// What the loop does next with an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Extract fields
    Proceed,
    /// Navigate again for the same item
    Retry,
    /// Give up on this item, continue with the next
    Skip,
    /// Stop the whole run
    Abort,
}

/// How an error while reading an item's fields is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionFailure {
    /// Log and move on to the next item
    #[default]
    Skip,
    /// Stop the run and return the error
    Abort,
}

/// One marker checked during classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRule {
    /// Short name used in logs
    pub name: String,
    pub selector: String,
    pub classification: PageClassification,
}

impl MarkerRule {
    pub fn new(
        name: impl Into<String>,
        selector: impl Into<String>,
        classification: PageClassification,
    ) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            classification,
        }
    }
}

/// Result of probing a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub classification: PageClassification,
    /// Name of the marker that matched, if any
    pub marker: Option<String>,
}

/// Marker table and per-classification decisions
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    rules: Vec<MarkerRule>,
    max_transient_retries: u32,
    on_extraction_error: ExtractionFailure,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new(vec![
            MarkerRule::new(
                "quota-exceeded",
                "[role=\"alertdialog\"] .quota-exceeded",
                PageClassification::QuotaExceeded,
            ),
            MarkerRule::new(
                "service-error",
                "[data-inspection-result] .error-banner",
                PageClassification::TransientError,
            ),
            MarkerRule::new(
                "not-in-property",
                "[data-inspection-result] .not-in-property",
                PageClassification::ItemNotApplicable,
            ),
        ])
    }
}

impl FailurePolicy {
    /// Policy with the given rules, highest priority first
    pub fn new(rules: Vec<MarkerRule>) -> Self {
        Self {
            rules,
            max_transient_retries: 0,
            on_extraction_error: ExtractionFailure::default(),
        }
    }

    /// Append a rule with the lowest priority
    pub fn with_rule(mut self, rule: MarkerRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    pub fn with_extraction_failure(mut self, failure: ExtractionFailure) -> Self {
        self.on_extraction_error = failure;
        self
    }

    pub fn rules(&self) -> &[MarkerRule] {
        &self.rules
    }

    pub fn extraction_failure(&self) -> ExtractionFailure {
        self.on_extraction_error
    }

    /// Probe the current page, first matching rule wins
    pub async fn classify<D>(&self, driver: &mut D) -> Result<Classified, DriverError>
    where
        D: PageDriver + ?Sized,
    {
        for rule in &self.rules {
            if driver.exists(&rule.selector).await? {
                debug!(marker = %rule.name, "Marker present");
                return Ok(Classified {
                    classification: rule.classification,
                    marker: Some(rule.name.clone()),
                });
            }
        }

        Ok(Classified {
            classification: PageClassification::Ready,
            marker: None,
        })
    }

    /// Decide what to do with a classification on the given 0-based attempt
    pub fn dispose(&self, classification: PageClassification, attempt: u32) -> Disposition {
        match classification {
            PageClassification::Ready => Disposition::Proceed,
            PageClassification::TransientError if attempt < self.max_transient_retries => {
                Disposition::Retry
            }
            PageClassification::TransientError => Disposition::Skip,
            PageClassification::ItemNotApplicable => Disposition::Skip,
            PageClassification::QuotaExceeded => Disposition::Abort,
            PageClassification::SecondFactorRequired => Disposition::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockPage};

    fn selector_for(policy: &FailurePolicy, classification: PageClassification) -> String {
        policy
            .rules()
            .iter()
            .find(|r| r.classification == classification)
            .map(|r| r.selector.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_quota_marker_wins_over_service_error() {
        let policy = FailurePolicy::default();
        let page = MockPage::new()
            .with_marker(selector_for(&policy, PageClassification::TransientError))
            .with_marker(selector_for(&policy, PageClassification::QuotaExceeded));
        let mut driver = MockDriver::new(page, "#q");

        let classified = policy.classify(&mut driver).await.unwrap();
        assert_eq!(classified.classification, PageClassification::QuotaExceeded);
        assert_eq!(classified.marker.as_deref(), Some("quota-exceeded"));
    }

    #[tokio::test]
    async fn test_no_marker_is_ready() {
        let policy = FailurePolicy::default();
        let mut driver = MockDriver::new(MockPage::new(), "#q");

        let classified = policy.classify(&mut driver).await.unwrap();
        assert_eq!(classified.classification, PageClassification::Ready);
        assert_eq!(classified.marker, None);
    }

    #[tokio::test]
    async fn test_added_rule_classifies_without_loop_changes() {
        let policy = FailurePolicy::default().with_rule(MarkerRule::new(
            "server-busy",
            ".server-busy",
            PageClassification::TransientError,
        ));
        let mut driver = MockDriver::new(MockPage::new().with_marker(".server-busy"), "#q");

        let classified = policy.classify(&mut driver).await.unwrap();
        assert_eq!(classified.classification, PageClassification::TransientError);
        assert_eq!(classified.marker.as_deref(), Some("server-busy"));
    }

    #[test]
    fn test_dispositions() {
        let policy = FailurePolicy::default();
        assert_eq!(policy.dispose(PageClassification::Ready, 0), Disposition::Proceed);
        assert_eq!(policy.dispose(PageClassification::QuotaExceeded, 0), Disposition::Abort);
        assert_eq!(policy.dispose(PageClassification::TransientError, 0), Disposition::Skip);
        assert_eq!(policy.dispose(PageClassification::ItemNotApplicable, 0), Disposition::Skip);
        assert_eq!(
            policy.dispose(PageClassification::SecondFactorRequired, 0),
            Disposition::Abort
        );
    }

    #[test]
    fn test_transient_retries_until_budget_is_spent() {
        let policy = FailurePolicy::default().with_max_transient_retries(2);
        assert_eq!(policy.dispose(PageClassification::TransientError, 0), Disposition::Retry);
        assert_eq!(policy.dispose(PageClassification::TransientError, 1), Disposition::Retry);
        assert_eq!(policy.dispose(PageClassification::TransientError, 2), Disposition::Skip);
    }
}

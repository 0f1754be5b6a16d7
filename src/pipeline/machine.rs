//! Loop states and the pure transitions between them.
//!
//! Each function takes the outcome of the work done in one state and returns
//! the next state. None of them touch the browser, so every decision the loop
//! makes can be tested on its own.

use crate::extractor::ExtractError;
use crate::input::WorkItem;
use crate::policy::{Classified, Disposition, ExtractionFailure, FailurePolicy, PageClassification};
use crate::record::ExtractionResult;

/// Why an item was given up on
#[derive(Debug)]
pub enum SkipReason {
    /// A page marker said so
    Classified {
        classification: PageClassification,
        marker: Option<String>,
    },
    /// Navigating or reading fields failed
    Failed(ExtractError),
}

/// Why the whole run stops early
#[derive(Debug)]
pub enum AbortReason {
    /// A page marker said so
    Classified {
        classification: PageClassification,
        marker: Option<String>,
    },
    /// Navigating or reading fields failed under a fatal policy
    Failed(ExtractError),
}

/// State of the extraction loop
#[derive(Debug)]
pub enum LoopState {
    Idle,
    Navigating { item: WorkItem, attempt: u32 },
    Classifying { item: WorkItem, attempt: u32 },
    Extracting { item: WorkItem },
    Skipping { item: WorkItem, reason: SkipReason },
    Aborting { item: WorkItem, reason: AbortReason },
    Stopped,
}

impl LoopState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Take the next item, or stop when the input is exhausted
pub fn idle(next: Option<WorkItem>) -> LoopState {
    match next {
        Some(item) => LoopState::Navigating { item, attempt: 0 },
        None => LoopState::Stopped,
    }
}

/// After navigating to the inspection surface and typing the query
pub fn navigated(
    item: WorkItem,
    attempt: u32,
    outcome: Result<(), ExtractError>,
    policy: &FailurePolicy,
) -> LoopState {
    match outcome {
        Ok(()) => LoopState::Classifying { item, attempt },
        Err(error) => failed(item, error, policy),
    }
}

/// After probing the page markers
pub fn classified(
    item: WorkItem,
    attempt: u32,
    outcome: Result<Classified, ExtractError>,
    policy: &FailurePolicy,
) -> LoopState {
    let Classified {
        classification,
        marker,
    } = match outcome {
        Ok(classified) => classified,
        Err(error) => return failed(item, error, policy),
    };

    match policy.dispose(classification, attempt) {
        Disposition::Proceed => LoopState::Extracting { item },
        Disposition::Retry => LoopState::Navigating {
            item,
            attempt: attempt.saturating_add(1),
        },
        Disposition::Skip => LoopState::Skipping {
            item,
            reason: SkipReason::Classified {
                classification,
                marker,
            },
        },
        Disposition::Abort => LoopState::Aborting {
            item,
            reason: AbortReason::Classified {
                classification,
                marker,
            },
        },
    }
}

/// After reading the item's fields; a success yields the record to persist
pub fn extracted(
    item: WorkItem,
    outcome: Result<ExtractionResult, ExtractError>,
    policy: &FailurePolicy,
) -> (LoopState, Option<ExtractionResult>) {
    match outcome {
        Ok(result) => (LoopState::Idle, Some(result)),
        Err(error) => (failed(item, error, policy), None),
    }
}

/// After the skip has been logged
pub fn skipped() -> LoopState {
    LoopState::Idle
}

/// After the abort has been logged and its snapshot attempted
pub fn aborted() -> LoopState {
    LoopState::Stopped
}

fn failed(item: WorkItem, error: ExtractError, policy: &FailurePolicy) -> LoopState {
    match policy.extraction_failure() {
        ExtractionFailure::Skip => LoopState::Skipping {
            item,
            reason: SkipReason::Failed(error),
        },
        ExtractionFailure::Abort => LoopState::Aborting {
            item,
            reason: AbortReason::Failed(error),
        },
    }
}

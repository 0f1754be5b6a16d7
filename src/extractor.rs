//! # Field Extraction
//!
//! Reads one inspection result once the page has been classified as ready.
//! A result is only returned when every read succeeded, so a failure part
//! way through never produces a partial record.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::PipelineConfig;
use crate::driver::{DriverError, PageDriver};
use crate::input::WorkItem;
use crate::record::{ExtractionResult, FieldValue};
use crate::surface::{GroupSpec, Surface};

/// Error type for reading an item's fields
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A page operation failed
    #[error("page driver error: {0}")]
    Driver(#[from] DriverError),

    /// The extra-info panel did not match the declared groups
    #[error("expected {expected} extra-info groups, found {found}")]
    GroupCount { expected: usize, found: usize },
}

/// Read every field for `item` from the current page
#[instrument(skip_all, fields(index = item.index(), url = %item.normalized()))]
pub async fn extract<D>(
    driver: &mut D,
    surface: &Surface,
    config: &PipelineConfig,
    item: &WorkItem,
) -> Result<ExtractionResult, ExtractError>
where
    D: PageDriver + ?Sized,
{
    let url = item.normalized();
    let selectors = &surface.results;
    let mut result = ExtractionResult::new(&url);

    driver.click(&selectors.reveal).await?;
    driver
        .wait_for_selector(&selectors.ready_marker, config.default_timeout)
        .await?;

    for field in &selectors.primary {
        let text = driver.inner_text(&field.selector).await?;
        result.insert(&field.label, clean_text(&text));
    }

    driver.click(&selectors.detail_toggle).await?;
    for field in &selectors.detail {
        driver
            .wait_for_selector(&field.selector, config.default_timeout)
            .await?;
        let text = driver.inner_text(&field.selector).await?;
        result.insert(&field.label, clean_text(&text));
    }

    let groups = driver
        .grouped_texts(&selectors.group, &selectors.group_value)
        .await?;
    for (label, value) in fold_groups(&selectors.groups, groups, &url)? {
        result.insert(label, value);
    }

    debug!("Extracted {} fields", result.field_names().count());
    Ok(result)
}

/// Match raw groups against the declared ones and fold each into a field
pub fn fold_groups(
    specs: &[GroupSpec],
    groups: Vec<Vec<String>>,
    url: &str,
) -> Result<Vec<(String, FieldValue)>, ExtractError> {
    if groups.len() != specs.len() {
        return Err(ExtractError::GroupCount {
            expected: specs.len(),
            found: groups.len(),
        });
    }

    Ok(specs
        .iter()
        .zip(groups)
        .map(|(spec, values)| (spec.label.clone(), fold_group(spec, values, url)))
        .collect())
}

/// Fold one group; a self-canonical placeholder becomes the inspected URL
pub fn fold_group(spec: &GroupSpec, values: Vec<String>, url: &str) -> FieldValue {
    let values: Vec<String> = values.iter().map(|v| clean_text(v)).collect();
    let is_self = match (&spec.self_placeholder, values.first()) {
        (Some(placeholder), Some(first)) => first == placeholder,
        _ => false,
    };

    if is_self {
        FieldValue::Text(url.to_string())
    } else {
        FieldValue::fold(values)
    }
}

/// Collapse runs of whitespace and drop carriage returns
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

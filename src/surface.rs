//! # Inspection Surface
//!
//! Everything the pipeline knows about the pages it drives: entry URLs,
//! selectors, and the labels under which extracted values are stored. The
//! defaults describe the search-console sign-in flow and its URL inspection
//! tool; a different target only needs a different `Surface`.
//!
//! ## Key Components
//!
//! - `LoginSelectors`: sign-in form, second-factor prompt, landing marker
//! - `QuerySelectors`: the inspection search box and how to submit it
//! - `ResultSelectors`: result fields, the detail panel and the grouped extra info
//! - `GroupSpec`: one declared extra-info group and its canonical placeholder

/// A labelled value read from a single selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name in the result
    pub label: String,
    /// Selector whose rendered text is the value
    pub selector: String,
}

impl FieldSpec {
    pub fn new(label: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            selector: selector.into(),
        }
    }
}

/// One declared group of the extra-info panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    /// Field name in the result
    pub label: String,
    /// If the group's first value equals this text, the inspected URL is stored instead
    pub self_placeholder: Option<String>,
}

impl GroupSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            self_placeholder: None,
        }
    }

    pub fn with_self_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.self_placeholder = Some(placeholder.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoginSelectors {
    pub identity_input: String,
    pub secret_input: String,
    pub second_factor_marker: String,
    pub landing_marker: String,
}

#[derive(Debug, Clone)]
pub struct QuerySelectors {
    /// The search box that takes the URL
    pub input: String,
    /// Key pressed after typing, if the box needs one to submit
    pub submit_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResultSelectors {
    /// Affordance that reveals the detailed result
    pub reveal: String,
    /// Appears once the detailed result has rendered
    pub ready_marker: String,
    /// Read in order right after the result renders
    pub primary: Vec<FieldSpec>,
    /// Expands the secondary detail panel
    pub detail_toggle: String,
    /// Read in order once the panel is open
    pub detail: Vec<FieldSpec>,
    /// Container of one extra-info group
    pub group: String,
    /// One value inside a group
    pub group_value: String,
    /// Expected groups, in page order
    pub groups: Vec<GroupSpec>,
}

/// The full description of the target pages
#[derive(Debug, Clone)]
pub struct Surface {
    pub login_url: String,
    /// Inspection entry point; `{resource_id}` is replaced by the encoded site
    pub inspect_url_template: String,
    pub login: LoginSelectors,
    pub query: QuerySelectors,
    pub results: ResultSelectors,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            login_url: "https://accounts.google.com/ServiceLogin?service=sitemaps&continue=https%3A%2F%2Fsearch.google.com%2Fsearch-console".to_string(),
            inspect_url_template: "https://search.google.com/search-console/inspect?resource_id={resource_id}".to_string(),
            login: LoginSelectors {
                identity_input: "input[type=\"email\"]".to_string(),
                secret_input: "input[type=\"password\"]".to_string(),
                second_factor_marker: "[data-challengetype]".to_string(),
                landing_marker: "[role=\"search\"] input".to_string(),
            },
            query: QuerySelectors {
                input: "[role=\"search\"] input".to_string(),
                submit_key: Some("Enter".to_string()),
            },
            results: ResultSelectors {
                reveal: "[data-inspection-result] [role=\"button\"]".to_string(),
                ready_marker: "[data-inspection-result] .coverage-verdict".to_string(),
                primary: vec![
                    FieldSpec::new("Coverage", "[data-inspection-result] .coverage-verdict"),
                    FieldSpec::new("Index state", "[data-inspection-result] .index-state"),
                    FieldSpec::new("Description", "[data-inspection-result] .index-state-description"),
                ],
                detail_toggle: "[data-inspection-result] .coverage-details [role=\"button\"]".to_string(),
                detail: vec![FieldSpec::new("Last crawl", ".coverage-details .last-crawl-time")],
                group: ".coverage-details .extra-info-group".to_string(),
                group_value: ".extra-info-value".to_string(),
                groups: vec![
                    GroupSpec::new("Sitemaps"),
                    GroupSpec::new("Referring page"),
                    GroupSpec::new("User-declared canonical"),
                    GroupSpec::new("Google-canonical").with_self_placeholder("Inspected URL"),
                ],
            },
        }
    }
}

impl Surface {
    /// Inspection URL for a site, with the site identifier form-url-encoded
    pub fn inspect_url(&self, target_site: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target_site.as_bytes()).collect();
        self.inspect_url_template.replace("{resource_id}", &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_url_encodes_site() {
        let surface = Surface::default();
        assert_eq!(
            surface.inspect_url("https://example.com/"),
            "https://search.google.com/search-console/inspect?resource_id=https%3A%2F%2Fexample.com%2F"
        );
        assert_eq!(
            surface.inspect_url("sc-domain:example.com"),
            "https://search.google.com/search-console/inspect?resource_id=sc-domain%3Aexample.com"
        );
    }

    #[test]
    fn test_default_declares_four_groups() {
        let surface = Surface::default();
        let labels: Vec<&str> = surface
            .results
            .groups
            .iter()
            .map(|g| g.label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                "Sitemaps",
                "Referring page",
                "User-declared canonical",
                "Google-canonical"
            ]
        );
        assert_eq!(
            surface.results.groups[3].self_placeholder.as_deref(),
            Some("Inspected URL")
        );
    }
}

//! # Mock Page Driver for Testing
//!
//! Provides a `MockDriver` that implements `PageDriver` entirely in memory.
//! Pages are keyed by the text typed into the inspection query box, so a test
//! can script a different outcome for every URL without a browser. All calls
//! are recorded in a shared log that survives the driver being moved into a
//! session.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{DriverError, PageDriver};
use crate::surface::Surface;

/// One call made against the mock, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Goto(String),
    Type { selector: String, text: String },
    Click(String),
    Press(String),
    WaitFor(String),
    Exists(String),
    ReadText(String),
    ReadGroups(String),
    Screenshot(PathBuf),
    Close,
}

/// Scripted content of a single page
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    present: HashSet<String>,
    texts: HashMap<String, String>,
    groups: Vec<Vec<String>>,
    broken: HashSet<String>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a selector as present
    pub fn with_marker(mut self, selector: impl Into<String>) -> Self {
        self.present.insert(selector.into());
        self
    }

    /// Give a selector rendered text; the selector becomes present
    pub fn with_text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        let selector = selector.into();
        self.present.insert(selector.clone());
        self.texts.insert(selector, text.into());
        self
    }

    /// Set the grouped texts returned by `grouped_texts`
    pub fn with_groups(mut self, groups: Vec<Vec<&str>>) -> Self {
        self.groups = groups
            .into_iter()
            .map(|group| group.into_iter().map(String::from).collect())
            .collect();
        self
    }

    /// Make reads of a present selector fail
    pub fn with_broken(mut self, selector: impl Into<String>) -> Self {
        self.broken.insert(selector.into());
        self
    }

    /// The page a logged-in user sees before typing a query
    pub fn landing(surface: &Surface) -> Self {
        Self::new()
            .with_marker(&surface.login.identity_input)
            .with_marker(&surface.login.secret_input)
            .with_marker(&surface.login.landing_marker)
            .with_marker(&surface.query.input)
    }

    /// A fully indexed inspection result for `url`
    pub fn indexed(surface: &Surface, url: &str) -> Self {
        let texts = [
            "Submitted and indexed",
            "Indexing allowed? Yes",
            "URL is on Google",
        ];
        let mut page = Self::landing(surface).with_marker(&surface.results.ready_marker);
        for (field, text) in surface.results.primary.iter().zip(texts) {
            page = page.with_text(&field.selector, text);
        }
        for field in &surface.results.detail {
            page = page.with_text(&field.selector, "Oct 12, 2026, 4:02:17 AM");
        }
        page.with_groups(vec![
            vec!["https://example.com/sitemap.xml"],
            vec!["https://example.com/"],
            vec![url],
            vec!["Inspected URL"],
        ])
    }
}

/// Side effect run once when its query is typed
struct QueryHook(Box<dyn FnOnce() + Send>);

impl fmt::Debug for QueryHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryHook")
    }
}

#[derive(Debug, Default)]
struct MockState {
    base: MockPage,
    query_input: String,
    queries: HashMap<String, MockPage>,
    hooks: HashMap<String, QueryHook>,
    current: Option<String>,
    calls: Vec<DriverCall>,
    waits: Vec<(String, Duration)>,
    fail_screenshots: bool,
}

impl MockState {
    fn page(&self) -> &MockPage {
        self.current
            .as_ref()
            .and_then(|query| self.queries.get(query))
            .unwrap_or(&self.base)
    }
}

/// A scripted page driver
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a driver whose base page is `base` and whose query box is `query_input`
    pub fn new(base: MockPage, query_input: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                base,
                query_input: query_input.into(),
                ..Default::default()
            })),
        }
    }

    /// A driver that logs in cleanly against `surface`
    pub fn for_surface(surface: &Surface) -> Self {
        Self::new(MockPage::landing(surface), surface.query.input.clone())
    }

    /// Page shown after `query` has been typed into the query box
    pub async fn set_query_page(&self, query: impl Into<String>, page: MockPage) {
        self.state.lock().await.queries.insert(query.into(), page);
    }

    /// Run `hook` the first time `query` is typed into the query box
    pub async fn on_query(&self, query: impl Into<String>, hook: impl FnOnce() + Send + 'static) {
        self.state
            .lock()
            .await
            .hooks
            .insert(query.into(), QueryHook(Box::new(hook)));
    }

    /// Make every screenshot attempt fail
    pub async fn fail_screenshots(&self) {
        self.state.lock().await.fail_screenshots = true;
    }

    /// Snapshot of every call made so far
    pub async fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().await.calls.clone()
    }

    /// Bounds passed to every wait for `selector`, in order
    pub async fn wait_bounds(&self, selector: &str) -> Vec<Duration> {
        self.state
            .lock()
            .await
            .waits
            .iter()
            .filter(|(waited, _)| waited == selector)
            .map(|(_, timeout)| *timeout)
            .collect()
    }

    /// Number of calls matching a predicate
    pub async fn count_calls(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        self.state.lock().await.calls.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn goto(&mut self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::Goto(url.to_string()));
        state.current = None;
        Ok(())
    }

    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        _delay: Duration,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::Type {
            selector: selector.to_string(),
            text: text.to_string(),
        });
        if selector == state.query_input {
            state.current = Some(text.to_string());
            if let Some(QueryHook(hook)) = state.hooks.remove(text) {
                hook();
            }
        }
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        self.state
            .lock()
            .await
            .calls
            .push(DriverCall::Click(selector.to_string()));
        Ok(())
    }

    async fn press(&mut self, key: &str) -> Result<(), DriverError> {
        self.state
            .lock()
            .await
            .calls
            .push(DriverCall::Press(key.to_string()));
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::WaitFor(selector.to_string()));
        state.waits.push((selector.to_string(), timeout));
        if state.page().present.contains(selector) {
            Ok(())
        } else {
            Err(DriverError::Timeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, DriverError> {
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::Exists(selector.to_string()));
        Ok(state.page().present.contains(selector))
    }

    async fn inner_text(&mut self, selector: &str) -> Result<String, DriverError> {
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::ReadText(selector.to_string()));
        let page = state.page();
        if page.broken.contains(selector) {
            return Err(DriverError::Protocol(format!("detached node for `{selector}`")));
        }
        page.texts
            .get(selector)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(selector.to_string()))
    }

    async fn grouped_texts(
        &mut self,
        group_selector: &str,
        _value_selector: &str,
    ) -> Result<Vec<Vec<String>>, DriverError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(DriverCall::ReadGroups(group_selector.to_string()));
        Ok(state.page().groups.clone())
    }

    async fn screenshot(&mut self, path: &Path, _full_page: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::Screenshot(path.to_path_buf()));
        if state.fail_screenshots {
            return Err(DriverError::Protocol("screenshot failed".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.state.lock().await.calls.push(DriverCall::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_selects_page() {
        let surface = Surface::default();
        let mut driver = MockDriver::for_surface(&surface);
        driver
            .set_query_page(
                "https://example.com/",
                MockPage::new().with_text("#coverage", "Indexed"),
            )
            .await;

        assert!(!driver.exists("#coverage").await.unwrap());
        driver
            .type_text(&surface.query.input, "https://example.com/", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(driver.inner_text("#coverage").await.unwrap(), "Indexed");

        driver.goto("https://search.example/").await.unwrap();
        assert!(!driver.exists("#coverage").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_hook_runs_once() {
        let surface = Surface::default();
        let mut driver = MockDriver::for_surface(&surface);
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = fired.clone();
        driver
            .on_query("https://example.com/", move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        for _ in 0..2 {
            driver
                .type_text(&surface.query.input, "https://example.com/", Duration::ZERO)
                .await
                .unwrap();
        }
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_selector_times_out() {
        let mut driver = MockDriver::new(MockPage::new(), "#q");
        let err = driver
            .wait_for_selector("#nope", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(driver.wait_bounds("#nope").await, vec![Duration::from_secs(1)]);
    }
}

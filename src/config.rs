//! # Pipeline Configuration Module
//!
//! Every wait the pipeline performs is bounded by a value in `PipelineConfig`.
//! A long global default covers slow authenticated page loads, with shorter
//! explicit bounds for the second-factor check and the quota banner settle.
//!
//! ## Key Components
//!
//! - `PipelineConfig`: timeouts, pacing and output locations
//! - `PipelineConfigBuilder`: builder pattern implementation for easier configuration

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound for ordinary selector waits
    pub default_timeout: Duration,

    /// Bound for the post-login landing page
    pub landing_timeout: Duration,

    /// How long to look for a second-factor prompt
    pub second_factor_check: Duration,

    /// Pause granted to the operator to approve a second factor
    pub second_factor_wait: Duration,

    /// Pause after typing a query so a quota banner can render
    pub quota_settle: Duration,

    /// Delay between typed characters
    pub typing_delay: Duration,

    /// Inspections allowed per minute, `None` for unlimited
    pub rate_limit_per_minute: Option<NonZeroU32>,

    /// Structured output
    pub json_path: PathBuf,

    /// Tabular output
    pub csv_path: PathBuf,

    /// Full-page screenshot written when the run aborts on a page marker
    pub snapshot_path: PathBuf,

    /// Run the browser without a window
    pub headless: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(180),
            landing_timeout: Duration::from_secs(300),
            second_factor_check: Duration::from_secs(5),
            second_factor_wait: Duration::from_secs(30),
            quota_settle: Duration::from_secs(3),
            typing_delay: Duration::from_millis(50),
            rate_limit_per_minute: NonZeroU32::new(10),
            json_path: PathBuf::from("results.json"),
            csv_path: PathBuf::from("results.csv"),
            snapshot_path: PathBuf::from("quota-exceeded.png"),
            headless: true,
        }
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn landing_timeout(mut self, timeout: Duration) -> Self {
        self.config.landing_timeout = timeout;
        self
    }

    pub fn second_factor_check(mut self, bound: Duration) -> Self {
        self.config.second_factor_check = bound;
        self
    }

    pub fn second_factor_wait(mut self, wait: Duration) -> Self {
        self.config.second_factor_wait = wait;
        self
    }

    pub fn quota_settle(mut self, settle: Duration) -> Self {
        self.config.quota_settle = settle;
        self
    }

    pub fn typing_delay(mut self, delay: Duration) -> Self {
        self.config.typing_delay = delay;
        self
    }

    /// Set the inspection rate; zero disables rate limiting
    pub fn rate_limit_per_minute(mut self, per_minute: u32) -> Self {
        self.config.rate_limit_per_minute = NonZeroU32::new(per_minute);
        self
    }

    pub fn json_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.json_path = path.into();
        self
    }

    pub fn csv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.csv_path = path.into();
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = path.into();
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Build the configuration
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl PipelineConfig {
    /// Create a new builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Configuration with every wait and pause collapsed, for tests and dry runs
    pub fn immediate() -> PipelineConfigBuilder {
        Self::builder()
            .default_timeout(Duration::from_millis(10))
            .landing_timeout(Duration::from_millis(10))
            .second_factor_check(Duration::ZERO)
            .second_factor_wait(Duration::ZERO)
            .quota_settle(Duration::ZERO)
            .typing_delay(Duration::ZERO)
            .rate_limit_per_minute(0)
    }

    /// A fresh limiter for the configured rate
    pub fn rate_limiter(&self) -> Option<DefaultDirectRateLimiter> {
        self.rate_limit_per_minute
            .map(|per_minute| RateLimiter::direct(Quota::per_minute(per_minute)))
    }
}

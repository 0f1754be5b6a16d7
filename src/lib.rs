//! # urlinspect - Checkpointed URL Inspection Extraction
//!
//! This crate drives an authenticated browser session through a search
//! console's URL inspection tool, one URL at a time, and records what the
//! tool reports about each URL. Results are written to JSON and CSV after
//! every item, so an interrupted run never loses finished work.
//!
//! ## Features
//!
//! - Sign-in with an optional second-factor pause
//! - Page classification from a prioritized marker table:
//!   - Quota exhaustion stops the run with a diagnostic screenshot
//!   - Service errors are retried up to a configured budget
//!   - URLs outside the property are skipped
//! - Rate-limited navigation with bounded waits everywhere
//! - Atomic rewrites of both output files after each result
//! - A scriptable in-memory page driver for tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use urlinspect::auth::Credentials;
//! use urlinspect::config::PipelineConfig;
//! use urlinspect::driver::ChromiumDriver;
//! use urlinspect::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::from_env()?;
//!     let config = PipelineConfig::builder()
//!         .rate_limit_per_minute(10)
//!         .json_path("results.json")
//!         .csv_path("results.csv")
//!         .build();
//!
//!     let headless = config.headless;
//!     let summary = Pipeline::new(config)
//!         .run("urls.txt", &credentials, || ChromiumDriver::launch(headless))
//!         .await?;
//!
//!     println!("{} of {} URLs extracted", summary.extracted, summary.total);
//!     Ok(())
//! }
//! ```

mod error;

pub mod auth;
pub mod config;
pub mod driver;
pub mod extractor;
pub mod input;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod sink;
pub mod surface;

pub use error::{Error, Result};

/// Re-export of the types most callers need
pub mod prelude {
    pub use crate::auth::Credentials;
    pub use crate::config::PipelineConfig;
    pub use crate::driver::PageDriver;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::pipeline::{Pipeline, RunOutcome, RunSummary};
    pub use crate::record::{ExtractionResult, FieldValue};
}

//! Error types for the urlinspect crate

use thiserror::Error;

use crate::auth::AuthError;
use crate::driver::DriverError;
use crate::extractor::ExtractError;
use crate::input::InputError;
use crate::sink::SinkError;

/// Result type for urlinspect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for urlinspect operations
///
/// Only fatal conditions surface here. Per-item outcomes (skips, retries, a
/// quota abort) are reported through the run summary instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The work list could not be read
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Login did not reach the authenticated landing page
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The browser could not be started or stopped
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Field extraction failed under a policy that treats it as fatal
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Results could not be written
    #[error("Persistence error: {0}")]
    Sink(#[from] SinkError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

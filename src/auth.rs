//! # Session Authenticator
//!
//! Drives the sign-in flow on a fresh page and hands back a [`Session`] once
//! the authenticated landing page has loaded. Every wait is bounded; the only
//! wait allowed to fail the login is the final landing-page wait (or an
//! earlier form field that never appears).

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::driver::{DriverError, PageDriver};
use crate::policy::PageClassification;
use crate::surface::Surface;

/// Environment variable holding the sign-in identity
pub const IDENTITY_ENV: &str = "URLINSPECT_EMAIL";
/// Environment variable holding the sign-in secret
pub const SECRET_ENV: &str = "URLINSPECT_PASSWORD";
/// Environment variable holding the site identifier
pub const SITE_ENV: &str = "URLINSPECT_SITE";

/// Error type for authentication
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential was not supplied
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    /// A sign-in step failed
    #[error("login step `{step}` failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: DriverError,
    },

    /// The authenticated landing page never appeared
    #[error("landing page did not load: {0}")]
    Landing(#[source] DriverError),
}

/// Sign-in identity, secret and the site to inspect
#[derive(Debug)]
pub struct Credentials {
    identity: String,
    secret: SecretString,
    target_site: String,
}

impl Credentials {
    pub fn new(
        identity: impl Into<String>,
        secret: impl Into<String>,
        target_site: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::from(secret.into()),
            target_site: target_site.into(),
        }
    }

    /// Read credentials from `URLINSPECT_EMAIL`, `URLINSPECT_PASSWORD` and `URLINSPECT_SITE`
    pub fn from_env() -> Result<Self, AuthError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::MissingCredential(name))
        };
        Ok(Self::new(read(IDENTITY_ENV)?, read(SECRET_ENV)?, read(SITE_ENV)?))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn target_site(&self) -> &str {
        &self.target_site
    }
}

/// An authenticated browsing session
///
/// Owns the page driver until [`Session::close`] consumes it.
pub struct Session<D: PageDriver> {
    driver: D,
    target_site: String,
    authenticated_at: DateTime<Utc>,
}

impl<D: PageDriver> Session<D> {
    /// Wrap a driver whose page is already signed in
    pub fn from_authenticated(driver: D, target_site: impl Into<String>) -> Self {
        Self {
            driver,
            target_site: target_site.into(),
            authenticated_at: Utc::now(),
        }
    }

    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn target_site(&self) -> &str {
        &self.target_site
    }

    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }

    /// Release the browser
    pub async fn close(mut self) -> Result<(), DriverError> {
        self.driver.close().await
    }
}

/// Sign in and wait for the authenticated landing page.
///
/// On failure the driver is closed before the error is returned.
#[instrument(skip_all, fields(identity = %credentials.identity(), site = %credentials.target_site()))]
pub async fn authenticate<D: PageDriver>(
    mut driver: D,
    credentials: &Credentials,
    surface: &Surface,
    config: &PipelineConfig,
) -> Result<Session<D>, AuthError> {
    match sign_in(&mut driver, credentials, surface, config).await {
        Ok(()) => {
            info!("Signed in");
            Ok(Session::from_authenticated(
                driver,
                credentials.target_site(),
            ))
        }
        Err(e) => {
            if let Err(close_err) = driver.close().await {
                warn!("Failed to close browser after login failure: {}", close_err);
            }
            Err(e)
        }
    }
}

async fn sign_in<D: PageDriver>(
    driver: &mut D,
    credentials: &Credentials,
    surface: &Surface,
    config: &PipelineConfig,
) -> Result<(), AuthError> {
    let step = |step: &'static str| move |source: DriverError| AuthError::Step { step, source };
    let login = &surface.login;

    driver
        .goto(&surface.login_url)
        .await
        .map_err(step("open login page"))?;

    driver
        .wait_for_selector(&login.identity_input, config.default_timeout)
        .await
        .map_err(step("identity field"))?;
    driver
        .type_text(&login.identity_input, credentials.identity(), config.typing_delay)
        .await
        .map_err(step("enter identity"))?;
    driver.press("Enter").await.map_err(step("submit identity"))?;

    driver
        .wait_for_selector(&login.secret_input, config.default_timeout)
        .await
        .map_err(step("secret field"))?;
    driver
        .type_text(
            &login.secret_input,
            credentials.secret.expose_secret(),
            config.typing_delay,
        )
        .await
        .map_err(step("enter secret"))?;
    driver.press("Enter").await.map_err(step("submit secret"))?;

    match driver
        .wait_for_selector(&login.second_factor_marker, config.second_factor_check)
        .await
    {
        Ok(()) => {
            warn!(
                classification = %PageClassification::SecondFactorRequired,
                "Second factor required: approve the sign-in on your device within {:?}",
                config.second_factor_wait
            );
            tokio::time::sleep(config.second_factor_wait).await;
        }
        Err(e) if e.is_timeout() => info!("No second factor detected"),
        Err(e) => return Err(AuthError::Step {
            step: "second factor check",
            source: e,
        }),
    }

    driver
        .wait_for_selector(&login.landing_marker, config.landing_timeout)
        .await
        .map_err(AuthError::Landing)
}

//! Bounded-retry login flow

use crate::crawler::DiagnosticsSink;
use crate::reader::{CodeOutcome, LoginStep, NavError, PageReader};
use crate::session::CodePrompt;
use thiserror::Error;

/// Number of full login attempts before the crawl gives up
pub const LOGIN_RETRY_LIMIT: usize = 2;

/// Errors raised while establishing the session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Every attempt within the retry ceiling failed
    #[error("Login failed after {attempts} attempts")]
    LoginFailed { attempts: usize },

    /// The site is refusing attempts after repeated recent failures;
    /// retrying immediately will not help
    #[error("The site is rate limiting login attempts; wait before retrying")]
    RateLimited,

    #[error("Navigation error during login: {0}")]
    Nav(#[from] NavError),

    #[error("Failed to read verification code: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Establishes and maintains the authenticated session
///
/// Owns the login identifiers and the code prompt; the page reader is lent
/// in per call because the driver owns the one navigable session.
pub struct SessionProvider<P: CodePrompt> {
    user: String,
    mail: String,
    prompt: P,
}

impl<P: CodePrompt> SessionProvider<P> {
    pub fn new(user: impl Into<String>, mail: impl Into<String>, prompt: P) -> Self {
        Self {
            user: user.into(),
            mail: mail.into(),
            prompt,
        }
    }

    /// Ensures the current page is served to a logged-in session
    ///
    /// No-op when the logged-out marker is absent. Otherwise runs the
    /// challenge flow up to [`LOGIN_RETRY_LIMIT`] times, capturing a
    /// diagnostic snapshot after each failed attempt, and fails with
    /// [`SessionError::LoginFailed`] once the ceiling is exceeded.
    pub async fn ensure_logged_in<R: PageReader>(
        &mut self,
        reader: &mut R,
        diagnostics: &DiagnosticsSink,
    ) -> Result<(), SessionError> {
        if !reader.logged_out().await? {
            return Ok(());
        }

        tracing::info!("Session expired; starting login");

        for attempt in 1..=LOGIN_RETRY_LIMIT {
            if attempt > 1 {
                tracing::info!("Retrying login ({}/{})", attempt, LOGIN_RETRY_LIMIT);
            }

            self.attempt_login(reader).await?;

            if !reader.logged_out().await? {
                tracing::info!("Login succeeded");
                return Ok(());
            }

            tracing::warn!("Login attempt {} failed", attempt);
            diagnostics.capture(reader, "login-failed").await;
        }

        tracing::error!("Giving up on login");
        Err(SessionError::LoginFailed {
            attempts: LOGIN_RETRY_LIMIT,
        })
    }

    async fn attempt_login<R: PageReader>(&mut self, reader: &mut R) -> Result<(), SessionError> {
        match reader.begin_login(&self.user).await? {
            LoginStep::RateLimited => {
                tracing::error!("Login refused after repeated failures; leave time before retrying");
                return Err(SessionError::RateLimited);
            }
            LoginStep::CodeSent => {}
        }

        tracing::info!("Waiting for the one-time verification code");
        let code = self.prompt.read_code()?;

        match reader.submit_code(&code).await? {
            CodeOutcome::LoggedIn => {}
            CodeOutcome::IdentityCheck => {
                tracing::info!("Answering the identity confirmation question");
                reader.confirm_identity(&self.mail).await?;
            }
            CodeOutcome::Rejected => {
                tracing::warn!("Verification code was rejected");
            }
        }

        Ok(())
    }
}

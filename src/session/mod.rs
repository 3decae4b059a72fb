//! Session module
//!
//! Establishes and maintains the authenticated browsing session. The login
//! challenge flow needs a one-time code from outside the process; that input
//! arrives through the [`CodePrompt`] trait.

mod login;
mod prompt;

pub use login::{SessionProvider, SessionError, LOGIN_RETRY_LIMIT};
pub use prompt::{CodePrompt, StdinPrompt};

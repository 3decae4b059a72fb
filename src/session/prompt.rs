//! Human-input provider for login challenges

/// Blocking source of one-time verification codes
///
/// Implementations block until a code is available; the crawl cannot make
/// progress without one anyway.
pub trait CodePrompt {
    fn read_code(&mut self) -> std::io::Result<String>;
}

/// Interactive stdin prompt for the one-time login code
pub struct StdinPrompt;

impl CodePrompt for StdinPrompt {
    fn read_code(&mut self) -> std::io::Result<String> {
        let code: String = dialoguer::Input::new()
            .with_prompt("Enter the verification code sent to your phone")
            .interact_text()
            .map_err(|e| match e {
                dialoguer::Error::IO(io) => io,
            })?;

        Ok(code.trim().to_string())
    }
}

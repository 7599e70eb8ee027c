use crate::error::Result;
use secrecy::{ExposeSecret, SecretString};

/// Interactive console input used by the flows.
pub trait Prompter {
    /// Read one line with echo.
    fn read_line(&self, prompt: &str) -> Result<String>;

    /// Read one line with echo disabled.
    fn read_password(&self, prompt: &str) -> Result<SecretString>;
}

/// Prompt until a non-empty password is entered.
pub(crate) fn read_non_empty_password(prompter: &dyn Prompter, prompt: &str) -> Result<SecretString> {
    loop {
        let password = prompter.read_password(prompt)?;
        if !password.expose_secret().is_empty() {
            return Ok(password);
        }
        tracing::debug!("Empty password entered, prompting again");
    }
}

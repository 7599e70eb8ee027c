//! Console prompts.

use conjur_core::{Error, Prompter, Result};
use secrecy::SecretString;
use std::io::{self, Write};

/// Reads from stdin; prompts go to stderr so JSON output stays clean.
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn read_line(&self, prompt: &str) -> Result<String> {
        eprint!("{prompt}");
        io::stderr().flush()?;
        let mut line = String::new();
        let read = io::stdin().read_line(&mut line)?;
        if read == 0 {
            return Err(Error::Prompt("unexpected end of input".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_password(&self, prompt: &str) -> Result<SecretString> {
        rpassword::prompt_password(prompt)
            .map(SecretString::from)
            .map_err(|e| Error::Prompt(e.to_string()))
    }
}

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Shown in place of a secret in every textual representation.
pub const MASK: &str = "****";

/// The one credential stored per machine: login name plus API key (or
/// password).
pub struct CredentialRecord {
    pub machine: String,
    pub login: String,
    secret: SecretString,
}

impl CredentialRecord {
    pub fn new(
        machine: impl Into<String>,
        login: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            machine: machine.into(),
            login: login.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Same machine, new login and secret.
    pub fn rotated(&self, login: &str, secret: &SecretString) -> Self {
        Self::new(
            self.machine.clone(),
            login,
            secret.expose_secret().to_owned(),
        )
    }

    /// Both the login and the secret are present.
    pub fn is_complete(&self) -> bool {
        !self.login.is_empty() && !self.expose_secret().is_empty()
    }
}

impl Clone for CredentialRecord {
    fn clone(&self) -> Self {
        Self::new(
            self.machine.clone(),
            self.login.clone(),
            self.expose_secret().to_owned(),
        )
    }
}

impl PartialEq for CredentialRecord {
    fn eq(&self, other: &Self) -> bool {
        self.machine == other.machine
            && self.login == other.login
            && self.expose_secret() == other.expose_secret()
    }
}

impl Eq for CredentialRecord {}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("machine", &self.machine)
            .field("login", &self.login)
            .field("secret", &MASK)
            .finish()
    }
}

impl fmt::Display for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{machine: {}, login: {}, secret: {}}}",
            self.machine, self.login, MASK
        )
    }
}

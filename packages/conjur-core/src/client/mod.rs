//! Remote authentication API.
//!
//! [`AuthClient`] lists every call the flows make against the server;
//! [`HttpAuthClient`] is the HTTP implementation.

mod http;

pub use http::{HttpAuthClient, token_authorization_header};

use crate::error::Result;
use crate::trust::TrustContext;
use secrecy::SecretString;

pub trait AuthClient {
    /// Exchange a password for the long-lived API key.
    fn login(
        &self,
        trust: &TrustContext,
        identity: &str,
        password: &SecretString,
    ) -> Result<SecretString>;

    /// Exchange the API key for a short-lived session token.
    fn authenticate(
        &self,
        trust: &TrustContext,
        identity: &str,
        api_key: &SecretString,
    ) -> Result<String>;

    fn rotate_personal_api_key(
        &self,
        identity: &str,
        current_secret: &SecretString,
    ) -> Result<SecretString>;

    /// Rotate the API key of another role, e.g. `host:myapp`.
    fn rotate_other_api_key(&self, target: &RoleId) -> Result<SecretString>;

    fn change_personal_password(
        &self,
        identity: &str,
        current_secret: &SecretString,
        new_password: &SecretString,
    ) -> Result<()>;
}

/// `kind:id` role identifier. A bare id is a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleId {
    pub kind: String,
    pub id: String,
}

impl RoleId {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.split_once(':') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => Self {
                kind: kind.to_string(),
                id: id.to_string(),
            },
            _ => Self {
                kind: "user".to_string(),
                id: value.to_string(),
            },
        }
    }

    pub fn host(id: &str) -> Self {
        Self {
            kind: "host".to_string(),
            id: id.to_string(),
        }
    }

    /// Login name this role authenticates with (`host/<id>` for hosts).
    pub fn login(&self) -> String {
        if self.kind == "user" {
            self.id.clone()
        } else {
            format!("{}/{}", self.kind, self.id)
        }
    }

    /// True if this role is the one logged in as `login`.
    pub fn is_login(&self, login: &str) -> bool {
        self.login() == login
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

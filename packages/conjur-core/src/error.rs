//! Error types for the Conjur client core.
//!
//! Every failure a flow can surface is a variant of [`Error`]. Messages are
//! shown to the user verbatim as a single line and MUST NOT contain secrets.

use std::path::PathBuf;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Only one of an explicit CA certificate file, self-signed mode or insecure mode may be used")]
    ConflictingTrustOptions,

    #[error("Unable to use certificate file '{}': {reason}", path.display())]
    CertificateFile { path: PathBuf, reason: String },

    #[error(
        "The server certificate of {url} could not be verified. \
         Configure the CA certificate with 'cert_file' or CONJUR_CERT_FILE"
    )]
    CertificateVerification { url: String },

    #[error("Credentials file '{}' is malformed: {reason}", path.display())]
    CredentialsFileMalformed { path: PathBuf, reason: String },

    #[error("Cannot store credentials: the {field} {reason}")]
    UnstorableCredentials {
        field: &'static str,
        reason: &'static str,
    },

    #[error("You are already logged out")]
    AlreadyLoggedOut,

    #[error("Failed to log out: {0}")]
    LogoutFailed(String),

    #[error("A login name is required")]
    MissingLoginName,

    #[error("Operation not completed: {0}")]
    OperationNotCompleted(String),

    #[error("The new password does not meet the password complexity requirements")]
    InvalidPasswordComplexity,

    #[error("{0}")]
    Unsupported(String),

    #[error("Authentication failed for '{0}'")]
    Unauthorized(String),

    #[error("Not logged in to {machine}. Run 'conjur login' first")]
    NotLoggedIn { machine: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("Failed to read input: {0}")]
    Prompt(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status of a passthrough transport failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_tls_verification(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError {
                kind: TransportErrorKind::TlsVerification,
                ..
            })
        )
    }
}

#[cfg(feature = "keyring-storage")]
impl From<keyring::Error> for Error {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoStorageAccess(_) => {
                Error::Keystore("Cannot access keystore storage".to_string())
            }
            keyring::Error::PlatformFailure(_) => {
                Error::Keystore("Platform-specific keystore failure".to_string())
            }
            _ => Error::Keystore(err.to_string()),
        }
    }
}

/// What went wrong talking to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The server answered with a non-success status.
    Status(u16),
    /// The server certificate did not chain to a trusted anchor.
    TlsVerification,
    /// The server could not be reached.
    Connection,
    /// The server answered with something we could not use.
    InvalidResponse,
}

/// Failure of a remote call, passed through the flows unchanged.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let detail = if body.len() > MAX_ERROR_BODY_LENGTH {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &body[..end])
        } else {
            body.to_string()
        };
        let reason = match status {
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            409 => "Conflict",
            422 => "Unprocessable Entity",
            500..=599 => "Server Error",
            _ => "Unexpected Status",
        };
        let message = if detail.is_empty() {
            format!("{status} ({reason})")
        } else {
            format!("{status} ({reason}): {detail}")
        };
        Self::new(TransportErrorKind::Status(status), message)
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message() {
        let err = TransportError::from_status(404, "role not found");
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "404 (Not Found): role not found");

        let err = TransportError::from_status(401, "");
        assert_eq!(err.to_string(), "401 (Unauthorized)");
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(1000);
        let err = TransportError::from_status(500, &body);
        assert!(err.to_string().ends_with("... (truncated)"));
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn test_tls_classification() {
        let err: Error = TransportError::new(TransportErrorKind::TlsVerification, "bad cert").into();
        assert!(err.is_tls_verification());
        assert!(err.is_transport());
        assert_eq!(err.status(), None);
        assert!(!Error::AlreadyLoggedOut.is_transport());
    }
}

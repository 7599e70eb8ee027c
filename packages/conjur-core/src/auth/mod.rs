//! Credentials and sessions.
//!
//! Provides the stored credential record, the credential stores, the
//! session-token cache and console prompting used by the flows.

mod prompt;
mod record;
mod session;
pub mod store;

pub use prompt::Prompter;
pub(crate) use prompt::read_non_empty_password;
pub use record::{CredentialRecord, MASK};
pub use session::{SessionToken, SessionTokenCache, TOKEN_TTL_MINUTES};
pub use store::{CredentialStore, FileStore, KeystoreStore, build_store};

#[cfg(test)]
pub(crate) use prompt::testing;

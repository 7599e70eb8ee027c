//! Conjur Client Core Library
//!
//! This crate provides the credential lifecycle of the Conjur CLI:
//! - TLS trust configuration (platform store, CA bundles, insecure modes)
//! - Credential storage (platform keystore or credentials file)
//! - Login, logout, API key rotation and password change flows
//! - Session token caching
//!
//! # Features
//!
//! - `keyring-storage` (default): Store credentials in the platform keystore
//! - `file-storage`: File-based credential storage only (for headless Linux)
//!
//! # Example
//!
//! ```no_run
//! use conjur_core::{auth, client, config, flows, trust};
//!
//! fn main() -> conjur_core::Result<()> {
//!     let loaded = config::load_config()?;
//!     let store = auth::build_store(&loaded.store)?;
//!     let resolver = trust::TrustResolver::new();
//!     let options = trust::TrustOptions::default();
//!     let trust_ctx = options.resolve(&resolver, &loaded.connection)?;
//!     let client = client::HttpAuthClient::new(loaded.connection.clone(), trust_ctx);
//!
//!     let identity = flows::WhoamiFlow::new(&loaded.connection, store.as_ref()).whoami()?;
//!     println!("Logged in as {}", identity.login);
//!
//!     let rotation = flows::RotateFlow::new(&loaded.connection, store.as_ref(), &client)
//!         .rotate(None)?;
//!     println!("Rotated API key of {}", rotation.identity);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod flows;
pub mod trust;

// Re-export commonly used types
pub use auth::{CredentialRecord, CredentialStore, Prompter, SessionTokenCache};
pub use client::{AuthClient, HttpAuthClient, RoleId};
pub use config::{AuthnType, ConnectionConfig, LoadedConfig, StoreKind};
pub use error::{Error, Result, TransportError};
pub use trust::{TrustContext, TrustOptions, TrustResolver};

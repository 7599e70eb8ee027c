//! Credential storage.
//!
//! One record per machine, held either in a credentials file or in the
//! platform keystore. The active store is chosen once by the process entry
//! point and handed to each flow.

mod file;
mod keystore;

pub use file::FileStore;
pub use keystore::{KEYSTORE_ENTRIES, KeyringBackend, KeystoreBackend, KeystoreStore};

#[cfg(feature = "keyring-storage")]
pub use keystore::NativeKeyring;

#[cfg(test)]
pub(crate) use keystore::MemoryKeystore;

use crate::auth::CredentialRecord;
use crate::config::{ConnectionConfig, StoreKind, StoreSettings};
use crate::error::Result;
use secrecy::SecretString;

/// Persists the single credential record of one machine.
pub trait CredentialStore {
    /// Write (or overwrite) the record.
    fn save(&self, record: &CredentialRecord) -> Result<()>;

    /// Read the record stored for `machine`.
    fn load(&self, machine: &str) -> Result<CredentialRecord>;

    /// True if a non-empty record is stored for `machine`.
    fn is_exists(&self, machine: &str) -> Result<bool>;

    /// Replace the secret of `record`, storing it under `login`.
    fn update_api_key_entry(
        &self,
        login: &str,
        record: &CredentialRecord,
        new_secret: &SecretString,
    ) -> Result<()>;

    /// Erase the record content for the configured server. The file or
    /// keystore namespace itself is kept.
    fn remove_credentials(&self, config: &ConnectionConfig) -> Result<()>;

    /// Best-effort erase of whatever is left for `machine`. Never fails
    /// because nothing is there.
    fn cleanup_if_exists(&self, machine: &str) -> Result<()>;

    /// Human readable description of where credentials live.
    fn store_location(&self) -> String;
}

/// Build the store selected by `settings`.
pub fn build_store(settings: &StoreSettings) -> Result<Box<dyn CredentialStore>> {
    let file_store = || -> Result<Box<dyn CredentialStore>> {
        let store = match &settings.netrc_path {
            Some(path) => FileStore::at(path),
            None => FileStore::new()?,
        };
        Ok(Box::new(store))
    };

    match settings.kind {
        StoreKind::File => file_store(),
        #[cfg(feature = "keyring-storage")]
        StoreKind::Keyring => Ok(Box::new(KeystoreStore::new(NativeKeyring::new()))),
        #[cfg(not(feature = "keyring-storage"))]
        StoreKind::Keyring => {
            tracing::warn!("Keyring storage is not compiled in, using file storage");
            file_store()
        }
    }
}

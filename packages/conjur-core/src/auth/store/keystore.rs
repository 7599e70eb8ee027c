//! Platform keystore credential storage.
//!
//! Each machine owns three entries in the keystore namespace named after the
//! machine URL:
//! - `machine`: the machine URL itself
//! - `login_id`: the login name
//! - `api_key`: the API key
//!
//! Backends:
//! - Windows: Credential Manager
//! - macOS: Keychain
//! - Linux: Secret Service (GNOME Keyring/KWallet) or kernel keyutils

use crate::auth::CredentialRecord;
use crate::auth::store::CredentialStore;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;
use std::fmt;

const ENTRY_MACHINE: &str = "machine";
const ENTRY_LOGIN: &str = "login_id";
const ENTRY_API_KEY: &str = "api_key";

/// Entry names written for every machine.
pub const KEYSTORE_ENTRIES: [&str; 3] = [ENTRY_MACHINE, ENTRY_LOGIN, ENTRY_API_KEY];

/// Environment variable selecting the native keystore backend.
const ENV_KEYRING_BACKEND: &str = "CONJUR_KEYRING_BACKEND";

/// String entries in a keystore, grouped by service name.
pub trait KeystoreBackend {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>>;
    fn set(&self, service: &str, key: &str, value: &str) -> Result<()>;
    /// Returns false when there was nothing to delete.
    fn delete(&self, service: &str, key: &str) -> Result<bool>;
    fn describe(&self) -> String;
}

pub struct KeystoreStore<B> {
    backend: B,
}

impl<B: KeystoreBackend> KeystoreStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: KeystoreBackend> CredentialStore for KeystoreStore<B> {
    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let service = record.machine.as_str();
        self.backend.set(service, ENTRY_MACHINE, &record.machine)?;
        self.backend.set(service, ENTRY_LOGIN, &record.login)?;
        self.backend
            .set(service, ENTRY_API_KEY, record.expose_secret())?;
        tracing::debug!("Credentials saved to keystore for {}", service);
        Ok(())
    }

    fn load(&self, machine: &str) -> Result<CredentialRecord> {
        let stored_machine = self.backend.get(machine, ENTRY_MACHINE)?;
        let login = self.backend.get(machine, ENTRY_LOGIN)?;
        let api_key = self.backend.get(machine, ENTRY_API_KEY)?;
        if login.is_none() || api_key.is_none() {
            tracing::debug!("Keystore entries for {} are incomplete", machine);
        }
        Ok(CredentialRecord::new(
            stored_machine.unwrap_or_else(|| machine.to_string()),
            login.unwrap_or_default(),
            api_key.unwrap_or_default(),
        ))
    }

    fn is_exists(&self, machine: &str) -> Result<bool> {
        let login = self.backend.get(machine, ENTRY_LOGIN)?;
        let api_key = self.backend.get(machine, ENTRY_API_KEY)?;
        Ok(matches!((login, api_key), (Some(l), Some(k)) if !l.is_empty() && !k.is_empty()))
    }

    fn update_api_key_entry(
        &self,
        login: &str,
        record: &CredentialRecord,
        new_secret: &SecretString,
    ) -> Result<()> {
        let rotated = record.rotated(login, new_secret);
        let service = rotated.machine.as_str();
        self.backend.set(service, ENTRY_LOGIN, &rotated.login)?;
        self.backend
            .set(service, ENTRY_API_KEY, rotated.expose_secret())?;
        tracing::debug!("API key updated in keystore for {}", service);
        Ok(())
    }

    fn remove_credentials(&self, config: &ConnectionConfig) -> Result<()> {
        let machine = config.machine();
        for key in KEYSTORE_ENTRIES {
            self.backend.delete(&machine, key)?;
        }
        tracing::debug!("Credentials for {} removed from keystore", machine);
        Ok(())
    }

    fn cleanup_if_exists(&self, machine: &str) -> Result<()> {
        for key in KEYSTORE_ENTRIES {
            match self.backend.delete(machine, key) {
                Ok(true) => tracing::warn!("Removed leftover keystore entry '{}' for {}", key, machine),
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to remove keystore entry '{}': {}", key, e),
            }
        }
        Ok(())
    }

    fn store_location(&self) -> String {
        self.backend.describe()
    }
}

// ============================================================================
// Native keyring backend
// ============================================================================

/// Keystore entries held by the OS keychain through the `keyring` crate.
#[cfg(feature = "keyring-storage")]
#[derive(Debug, Default)]
pub struct NativeKeyring;

#[cfg(feature = "keyring-storage")]
impl NativeKeyring {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        tracing::trace!("Creating keyring entry for service='{}', user='{}'", service, key);
        keyring::Entry::new(service, key).map_err(Error::from)
    }
}

#[cfg(feature = "keyring-storage")]
impl KeystoreBackend for NativeKeyring {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        match Self::entry(service, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<()> {
        Self::entry(service, key)?.set_password(value).map_err(|e| {
            tracing::warn!("Failed to store keyring entry '{}': {}", key, e);
            Error::from(e)
        })
    }

    fn delete(&self, service: &str, key: &str) -> Result<bool> {
        match Self::entry(service, key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn describe(&self) -> String {
        KeyringBackend::select()
            .map(|backend| backend.to_string())
            .unwrap_or_else(|_| "Platform keystore".to_string())
    }
}

// ============================================================================
// Backend selection
// ============================================================================

/// Native keystore implementation backing [`NativeKeyring`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyringBackend {
    SecretService,
    KeyUtils,
    Keychain,
    WindowsCredential,
    /// In-process only; nothing survives the process.
    Mock,
}

impl KeyringBackend {
    /// Default backend for the OS family this binary was built for.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            KeyringBackend::Keychain
        } else if cfg!(target_os = "windows") {
            KeyringBackend::WindowsCredential
        } else if cfg!(target_os = "linux") {
            KeyringBackend::SecretService
        } else {
            KeyringBackend::Mock
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "secret-service" | "secret_service" => Ok(KeyringBackend::SecretService),
            "keyutils" => Ok(KeyringBackend::KeyUtils),
            "keychain" | "macos" => Ok(KeyringBackend::Keychain),
            "windows" | "credential-manager" => Ok(KeyringBackend::WindowsCredential),
            "mock" => Ok(KeyringBackend::Mock),
            other => Err(Error::Configuration(format!(
                "unknown {ENV_KEYRING_BACKEND} value '{other}'"
            ))),
        }
    }

    /// `CONJUR_KEYRING_BACKEND` if set, otherwise the detected default.
    pub fn select() -> Result<Self> {
        Self::select_from(std::env::var(ENV_KEYRING_BACKEND).ok().as_deref())
    }

    fn select_from(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Self::parse(value),
            None => Ok(Self::detect()),
        }
    }

    /// Make this backend the default for every keyring entry created by the
    /// process. Called once at startup.
    #[cfg(feature = "keyring-storage")]
    pub fn install(self) -> Result<()> {
        let builder = match self {
            KeyringBackend::Mock => keyring::mock::default_credential_builder(),
            #[cfg(target_os = "linux")]
            KeyringBackend::SecretService => keyring::secret_service::default_credential_builder(),
            #[cfg(target_os = "linux")]
            KeyringBackend::KeyUtils => keyring::keyutils::default_credential_builder(),
            #[cfg(target_os = "macos")]
            KeyringBackend::Keychain => keyring::macos::default_credential_builder(),
            #[cfg(target_os = "windows")]
            KeyringBackend::WindowsCredential => keyring::windows::default_credential_builder(),
            #[allow(unreachable_patterns)]
            other => {
                return Err(Error::Keystore(format!(
                    "{other} is not available on this platform"
                )));
            }
        };
        keyring::set_default_credential_builder(builder);
        tracing::debug!("Keystore backend: {}", self);
        Ok(())
    }
}

impl fmt::Display for KeyringBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringBackend::SecretService => {
                write!(f, "Linux Secret Service (GNOME Keyring/KWallet)")
            }
            KeyringBackend::KeyUtils => write!(f, "Linux kernel keyutils"),
            KeyringBackend::Keychain => write!(f, "macOS Keychain"),
            KeyringBackend::WindowsCredential => write!(f, "Windows Credential Manager"),
            KeyringBackend::Mock => write!(f, "In-memory keystore (not persisted)"),
        }
    }
}

// ============================================================================
// In-memory backend for tests
// ============================================================================

#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryKeystore {
    entries: std::cell::RefCell<std::collections::HashMap<(String, String), String>>,
}

#[cfg(test)]
impl MemoryKeystore {
    pub fn contains(&self, service: &str, key: &str) -> bool {
        self.entries
            .borrow()
            .contains_key(&(service.to_string(), key.to_string()))
    }
}

#[cfg(test)]
impl KeystoreBackend for MemoryKeystore {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .borrow()
            .get(&(service.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .borrow_mut()
            .remove(&(service.to_string(), key.to_string()))
            .is_some())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

//! User-facing operations: login, logout, credential rotation, password
//! change and identity lookup.
//!
//! Flows borrow everything they use. The process entry point builds the
//! store, the auth client and the prompter once and passes them in.

mod login;
mod logout;
mod password;
mod rotate;
mod whoami;

pub use login::LoginFlow;
pub use logout::LogoutFlow;
pub use password::PasswordFlow;
pub use rotate::{RotateFlow, Rotation};
pub use whoami::{Identity, WhoamiFlow};

use crate::auth::{CredentialRecord, CredentialStore};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

/// Load the complete record stored for the configured server.
fn load_active_record(
    store: &dyn CredentialStore,
    config: &ConnectionConfig,
) -> Result<CredentialRecord> {
    let machine = config.machine();
    if !store.is_exists(&machine)? {
        return Err(Error::NotLoggedIn { machine });
    }
    let record = store.load(&machine)?;
    if !record.is_complete() {
        return Err(Error::NotLoggedIn { machine });
    }
    Ok(record)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::auth::store::MemoryKeystore;
    use crate::auth::{CredentialRecord, CredentialStore, KeystoreStore};
    use crate::client::{AuthClient, RoleId};
    use crate::config::ConnectionConfig;
    use crate::error::{Error, Result, TransportError};
    use crate::trust::TrustContext;
    use secrecy::{ExposeSecret, SecretString};
    use std::cell::{Cell, RefCell};

    pub const MACHINE: &str = "https://host/authn";

    pub fn config() -> ConnectionConfig {
        ConnectionConfig::new("https://host", "myorg").unwrap()
    }

    /// Scripted server. Each call is logged as `name:arg`.
    #[derive(Default)]
    pub struct FakeAuthClient {
        pub calls: RefCell<Vec<String>>,
        pub login_result: RefCell<Option<Result<String>>>,
        pub rotate_result: RefCell<Option<Result<String>>>,
        pub password_status: Cell<Option<u16>>,
        pub last_password: RefCell<Option<String>>,
    }

    impl FakeAuthClient {
        pub fn returning_key(key: &str) -> Self {
            let client = Self::default();
            *client.login_result.borrow_mut() = Some(Ok(key.to_string()));
            *client.rotate_result.borrow_mut() = Some(Ok(key.to_string()));
            client
        }

        pub fn failing_login(err: Error) -> Self {
            let client = Self::default();
            *client.login_result.borrow_mut() = Some(Err(err));
            client
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn take(slot: &RefCell<Option<Result<String>>>) -> Result<SecretString> {
            slot.borrow_mut()
                .take()
                .unwrap_or_else(|| Ok("DEFAULTKEY".to_string()))
                .map(SecretString::from)
        }
    }

    impl AuthClient for FakeAuthClient {
        fn login(
            &self,
            _trust: &TrustContext,
            identity: &str,
            password: &SecretString,
        ) -> Result<SecretString> {
            self.calls.borrow_mut().push(format!("login:{identity}"));
            *self.last_password.borrow_mut() = Some(password.expose_secret().to_string());
            Self::take(&self.login_result)
        }

        fn authenticate(
            &self,
            _trust: &TrustContext,
            identity: &str,
            _api_key: &SecretString,
        ) -> Result<String> {
            self.calls.borrow_mut().push(format!("authenticate:{identity}"));
            Ok("session-token".to_string())
        }

        fn rotate_personal_api_key(
            &self,
            identity: &str,
            current_secret: &SecretString,
        ) -> Result<SecretString> {
            self.calls.borrow_mut().push(format!(
                "rotate_personal:{identity}:{}",
                current_secret.expose_secret()
            ));
            Self::take(&self.rotate_result)
        }

        fn rotate_other_api_key(&self, target: &RoleId) -> Result<SecretString> {
            self.calls.borrow_mut().push(format!("rotate_other:{target}"));
            Self::take(&self.rotate_result)
        }

        fn change_personal_password(
            &self,
            identity: &str,
            _current_secret: &SecretString,
            new_password: &SecretString,
        ) -> Result<()> {
            self.calls.borrow_mut().push(format!("change_password:{identity}"));
            *self.last_password.borrow_mut() = Some(new_password.expose_secret().to_string());
            match self.password_status.get() {
                Some(status) => Err(TransportError::from_status(status, "").into()),
                None => Ok(()),
            }
        }
    }

    /// Keystore-backed store that counts calls and can fail on demand.
    pub struct RecordingStore {
        inner: KeystoreStore<MemoryKeystore>,
        pub calls: RefCell<Vec<&'static str>>,
        pub fail_update: Cell<bool>,
        pub fail_remove: Cell<bool>,
    }

    impl RecordingStore {
        pub fn new() -> Self {
            Self {
                inner: KeystoreStore::new(MemoryKeystore::default()),
                calls: RefCell::new(Vec::new()),
                fail_update: Cell::new(false),
                fail_remove: Cell::new(false),
            }
        }

        pub fn with_record(login: &str, secret: &str) -> Self {
            let store = Self::new();
            store
                .inner
                .save(&CredentialRecord::new(MACHINE, login, secret))
                .unwrap();
            store
        }

        pub fn count(&self, name: &str) -> usize {
            self.calls.borrow().iter().filter(|c| **c == name).count()
        }

        pub fn stored(&self) -> CredentialRecord {
            self.inner.load(MACHINE).unwrap()
        }
    }

    impl CredentialStore for RecordingStore {
        fn save(&self, record: &CredentialRecord) -> Result<()> {
            self.calls.borrow_mut().push("save");
            self.inner.save(record)
        }

        fn load(&self, machine: &str) -> Result<CredentialRecord> {
            self.calls.borrow_mut().push("load");
            self.inner.load(machine)
        }

        fn is_exists(&self, machine: &str) -> Result<bool> {
            self.calls.borrow_mut().push("is_exists");
            self.inner.is_exists(machine)
        }

        fn update_api_key_entry(
            &self,
            login: &str,
            record: &CredentialRecord,
            new_secret: &SecretString,
        ) -> Result<()> {
            self.calls.borrow_mut().push("update_api_key_entry");
            if self.fail_update.get() {
                return Err(Error::Keystore("keystore is locked".to_string()));
            }
            self.inner.update_api_key_entry(login, record, new_secret)
        }

        fn remove_credentials(&self, config: &ConnectionConfig) -> Result<()> {
            self.calls.borrow_mut().push("remove_credentials");
            if self.fail_remove.get() {
                return Err(Error::Keystore("keystore is locked".to_string()));
            }
            self.inner.remove_credentials(config)
        }

        fn cleanup_if_exists(&self, machine: &str) -> Result<()> {
            self.calls.borrow_mut().push("cleanup_if_exists");
            self.inner.cleanup_if_exists(machine)
        }

        fn store_location(&self) -> String {
            "recording".to_string()
        }
    }
}

use crate::auth::CredentialStore;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

pub struct LogoutFlow<'a> {
    config: &'a ConnectionConfig,
    store: &'a dyn CredentialStore,
}

impl<'a> LogoutFlow<'a> {
    pub fn new(config: &'a ConnectionConfig, store: &'a dyn CredentialStore) -> Self {
        Self { config, store }
    }

    /// Erase the stored credentials of the configured server.
    ///
    /// When no complete record exists, leftovers are cleaned up and the
    /// call still fails with [`Error::AlreadyLoggedOut`]. Any other failure
    /// is reported as [`Error::LogoutFailed`].
    pub fn remove_credentials(&self) -> Result<()> {
        let machine = self.config.machine();
        self.try_remove(&machine).map_err(|err| match err {
            Error::AlreadyLoggedOut => Error::AlreadyLoggedOut,
            other => {
                tracing::warn!("Logout from {} failed: {}", machine, other);
                Error::LogoutFailed(other.to_string())
            }
        })?;
        tracing::info!("Logged out from {}", machine);
        Ok(())
    }

    fn try_remove(&self, machine: &str) -> Result<()> {
        if !self.store.is_exists(machine)? {
            self.store.cleanup_if_exists(machine)?;
            return Err(Error::AlreadyLoggedOut);
        }
        self.store.remove_credentials(self.config)
    }
}

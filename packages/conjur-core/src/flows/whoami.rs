use crate::auth::CredentialStore;
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::flows::load_active_record;
use serde::Serialize;

/// Locally stored identity for the configured server.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub login: String,
    pub account: String,
    pub machine: String,
    pub store_location: String,
}

/// Report who is logged in without contacting the server.
pub struct WhoamiFlow<'a> {
    config: &'a ConnectionConfig,
    store: &'a dyn CredentialStore,
}

impl<'a> WhoamiFlow<'a> {
    pub fn new(config: &'a ConnectionConfig, store: &'a dyn CredentialStore) -> Self {
        Self { config, store }
    }

    pub fn whoami(&self) -> Result<Identity> {
        let record = load_active_record(self.store, self.config)?;
        Ok(Identity {
            login: record.login.clone(),
            account: self.config.account.clone(),
            machine: record.machine.clone(),
            store_location: self.store.store_location(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::flows::testing::{MACHINE, RecordingStore, config};

    #[test]
    fn test_whoami() {
        let config = config();
        let store = RecordingStore::with_record("alice", "KEY123");
        let identity = WhoamiFlow::new(&config, &store).whoami().unwrap();
        assert_eq!(identity.login, "alice");
        assert_eq!(identity.account, "myorg");
        assert_eq!(identity.machine, MACHINE);

        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("KEY123"));
    }

    #[test]
    fn test_whoami_when_logged_out() {
        let config = config();
        let store = RecordingStore::new();
        assert!(matches!(
            WhoamiFlow::new(&config, &store).whoami(),
            Err(Error::NotLoggedIn { .. })
        ));
    }
}

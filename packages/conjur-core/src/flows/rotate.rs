use crate::auth::CredentialStore;
use crate::client::{AuthClient, RoleId};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::flows::load_active_record;
use secrecy::SecretString;

/// Outcome of an API key rotation.
#[derive(Debug)]
pub struct Rotation {
    /// Login name whose key was rotated.
    pub identity: String,
    pub api_key: SecretString,
    /// The locally stored credentials were updated too.
    pub self_rotation: bool,
}

pub struct RotateFlow<'a> {
    config: &'a ConnectionConfig,
    store: &'a dyn CredentialStore,
    client: &'a dyn AuthClient,
}

impl<'a> RotateFlow<'a> {
    pub fn new(
        config: &'a ConnectionConfig,
        store: &'a dyn CredentialStore,
        client: &'a dyn AuthClient,
    ) -> Self {
        Self {
            config,
            store,
            client,
        }
    }

    /// Rotate the API key of `target`, or of the logged in identity when
    /// `target` is omitted or names it.
    pub fn rotate(&self, target: Option<&RoleId>) -> Result<Rotation> {
        let record = load_active_record(self.store, self.config)?;

        if let Some(target) = target.filter(|t| !t.is_login(&record.login)) {
            let api_key = self.client.rotate_other_api_key(target)?;
            tracing::info!("Rotated API key of {}", target);
            return Ok(Rotation {
                identity: target.login(),
                api_key,
                self_rotation: false,
            });
        }

        let api_key = self
            .client
            .rotate_personal_api_key(&record.login, record.secret())?;
        self.store
            .update_api_key_entry(&record.login, &record, &api_key)
            .map_err(|err| {
                if err.is_transport() {
                    return err;
                }
                tracing::warn!("Rotated API key could not be stored: {}", err);
                Error::OperationNotCompleted(format!(
                    "the API key of '{}' was rotated on the server but could not be saved \
                     locally ({}). Log in again to store the new key",
                    record.login, err
                ))
            })?;
        tracing::info!("Rotated own API key of {}", record.login);
        Ok(Rotation {
            identity: record.login.clone(),
            api_key,
            self_rotation: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::{FakeAuthClient, MACHINE, RecordingStore, config};
    use secrecy::ExposeSecret;

    #[test]
    fn test_self_rotation_updates_store() {
        let config = config();
        let store = RecordingStore::with_record("bob", "OLDKEY");
        let client = FakeAuthClient::returning_key("NEWKEY");

        let rotation = RotateFlow::new(&config, &store, &client).rotate(None).unwrap();

        assert_eq!(rotation.identity, "bob");
        assert_eq!(rotation.api_key.expose_secret(), "NEWKEY");
        assert!(rotation.self_rotation);
        assert_eq!(client.calls(), vec!["rotate_personal:bob:OLDKEY"]);
        assert_eq!(store.count("update_api_key_entry"), 1);
        let stored = store.stored();
        assert_eq!(stored.machine, MACHINE);
        assert_eq!(stored.expose_secret(), "NEWKEY");
    }

    #[test]
    fn test_naming_self_is_self_rotation() {
        for target in ["bob", "user:bob"] {
            let config = config();
            let store = RecordingStore::with_record("bob", "OLDKEY");
            let client = FakeAuthClient::returning_key("NEWKEY");

            let rotation = RotateFlow::new(&config, &store, &client)
                .rotate(Some(&RoleId::parse(target)))
                .unwrap();

            assert!(rotation.self_rotation);
            assert_eq!(rotation.identity, "bob");
            assert_eq!(store.count("update_api_key_entry"), 1);
            assert_eq!(client.calls(), vec!["rotate_personal:bob:OLDKEY"]);
        }
    }

    #[test]
    fn test_other_rotation_leaves_store_alone() {
        let config = config();
        let store = RecordingStore::with_record("bob", "OLDKEY");
        let client = FakeAuthClient::returning_key("HOSTKEY");

        let rotation = RotateFlow::new(&config, &store, &client)
            .rotate(Some(&RoleId::host("myapp")))
            .unwrap();

        assert!(!rotation.self_rotation);
        assert_eq!(rotation.identity, "host/myapp");
        assert_eq!(client.calls(), vec!["rotate_other:host:myapp"]);
        assert_eq!(store.count("update_api_key_entry"), 0);
        assert_eq!(store.stored().expose_secret(), "OLDKEY");
    }

    #[test]
    fn test_local_failure_after_remote_rotation() {
        let config = config();
        let store = RecordingStore::with_record("bob", "OLDKEY");
        store.fail_update.set(true);
        let client = FakeAuthClient::returning_key("NEWKEY");

        let err = RotateFlow::new(&config, &store, &client)
            .rotate(None)
            .unwrap_err();
        assert!(matches!(err, Error::OperationNotCompleted(_)));
        assert!(!err.to_string().contains("NEWKEY"));
    }

    #[test]
    fn test_remote_failure_passes_through() {
        let config = config();
        let store = RecordingStore::with_record("bob", "OLDKEY");
        let client = FakeAuthClient::default();
        *client.rotate_result.borrow_mut() =
            Some(Err(crate::error::TransportError::from_status(401, "").into()));

        let err = RotateFlow::new(&config, &store, &client)
            .rotate(None)
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(store.count("update_api_key_entry"), 0);
    }

    #[test]
    fn test_requires_login() {
        let config = config();
        let store = RecordingStore::new();
        let client = FakeAuthClient::returning_key("NEWKEY");
        assert!(matches!(
            RotateFlow::new(&config, &store, &client).rotate(None),
            Err(Error::NotLoggedIn { .. })
        ));
        assert!(client.calls().is_empty());
    }
}

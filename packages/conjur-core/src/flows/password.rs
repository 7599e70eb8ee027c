use crate::auth::{CredentialStore, Prompter, read_non_empty_password};
use crate::client::{AuthClient, RoleId};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::flows::load_active_record;
use secrecy::{ExposeSecret, SecretString};

/// Change the password of the logged in user. Only self-service is
/// supported.
pub struct PasswordFlow<'a> {
    config: &'a ConnectionConfig,
    store: &'a dyn CredentialStore,
    client: &'a dyn AuthClient,
    prompter: &'a dyn Prompter,
}

impl<'a> PasswordFlow<'a> {
    pub fn new(
        config: &'a ConnectionConfig,
        store: &'a dyn CredentialStore,
        client: &'a dyn AuthClient,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            config,
            store,
            client,
            prompter,
        }
    }

    /// Returns the login whose password was changed.
    pub fn change_password(
        &self,
        target: Option<&RoleId>,
        new_password: Option<SecretString>,
    ) -> Result<String> {
        let record = load_active_record(self.store, self.config)?;
        if let Some(target) = target.filter(|t| !t.is_login(&record.login)) {
            return Err(Error::Unsupported(format!(
                "Changing the password of {target} is not supported; only your own password can be changed"
            )));
        }

        let new_password = match new_password {
            Some(p) if !p.expose_secret().is_empty() => p,
            _ => read_non_empty_password(self.prompter, "Enter new password: ")?,
        };

        self.client
            .change_personal_password(&record.login, record.secret(), &new_password)
            .map_err(|err| match err.status() {
                Some(422) => Error::InvalidPasswordComplexity,
                Some(401) => Error::Unauthorized(record.login.clone()),
                _ => err,
            })?;
        tracing::info!("Password changed for {}", record.login);
        Ok(record.login)
    }
}

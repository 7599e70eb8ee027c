use crate::auth::{CredentialRecord, CredentialStore, Prompter, read_non_empty_password};
use crate::client::AuthClient;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::trust::{TrustOptions, TrustResolver};
use secrecy::{ExposeSecret, SecretString};

enum LoginState {
    AwaitingUsername,
    AwaitingPassword { username: String },
    Authenticating { username: String, password: SecretString },
    Persisted(CredentialRecord),
}

/// Exchange a login name and password for an API key and store it.
pub struct LoginFlow<'a> {
    config: &'a ConnectionConfig,
    trust: TrustOptions,
    resolver: &'a TrustResolver,
    store: &'a dyn CredentialStore,
    client: &'a dyn AuthClient,
    prompter: &'a dyn Prompter,
}

impl<'a> LoginFlow<'a> {
    pub fn new(
        config: &'a ConnectionConfig,
        trust: TrustOptions,
        resolver: &'a TrustResolver,
        store: &'a dyn CredentialStore,
        client: &'a dyn AuthClient,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            config,
            trust,
            resolver,
            store,
            client,
            prompter,
        }
    }

    /// Prompts for whatever of `identity`/`password` is missing. No retry on
    /// a failed server call.
    pub fn login(
        &self,
        mut identity: Option<String>,
        mut password: Option<SecretString>,
    ) -> Result<CredentialRecord> {
        let mut state = LoginState::AwaitingUsername;
        loop {
            state = match state {
                LoginState::AwaitingUsername => {
                    let username = match identity.take() {
                        Some(id) => id,
                        None => self.prompter.read_line("Enter your username to log into Conjur: ")?,
                    };
                    let username = username.trim();
                    if username.is_empty() {
                        return Err(Error::MissingLoginName);
                    }
                    LoginState::AwaitingPassword {
                        username: username.to_string(),
                    }
                }
                LoginState::AwaitingPassword { username } => {
                    let password = match password.take() {
                        Some(p) if !p.expose_secret().is_empty() => p,
                        _ => read_non_empty_password(self.prompter, "Enter your password or API key: ")?,
                    };
                    LoginState::Authenticating { username, password }
                }
                LoginState::Authenticating { username, password } => {
                    let secret = self.authenticate(&username, &password)?;
                    let record =
                        CredentialRecord::new(self.config.machine(), username, secret.expose_secret());
                    self.store.save(&record)?;
                    LoginState::Persisted(record)
                }
                LoginState::Persisted(record) => {
                    tracing::info!("Logged in as {} to {}", record.login, record.machine);
                    return Ok(record);
                }
            };
        }
    }

    fn authenticate(&self, username: &str, password: &SecretString) -> Result<SecretString> {
        let trust = self.trust.resolve(self.resolver, self.config)?;
        self.client
            .login(&trust, username, password)
            .map_err(|err| {
                if err.is_tls_verification() && !trust.has_explicit_ca_file() && !trust.is_insecure() {
                    tracing::debug!("TLS verification failed: {}", err);
                    Error::CertificateVerification {
                        url: self.config.base_url().to_string(),
                    }
                } else {
                    err
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MASK;
    use crate::auth::testing::ScriptedPrompter;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::flows::testing::{FakeAuthClient, MACHINE, RecordingStore, config};
    use crate::trust::PlatformKind;

    fn resolver() -> TrustResolver {
        TrustResolver::for_platform(PlatformKind::Linux).with_native_anchor_count(1)
    }

    fn tls_failure() -> Error {
        TransportError::new(TransportErrorKind::TlsVerification, "invalid peer certificate").into()
    }

    #[test]
    fn test_login_stores_api_key() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::returning_key("KEY123");
        let prompter = ScriptedPrompter::new(&[], &[]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        let record = flow
            .login(Some("alice".to_string()), Some(SecretString::from("p@ss".to_string())))
            .unwrap();

        assert_eq!(record, CredentialRecord::new(MACHINE, "alice", "KEY123"));
        assert_eq!(store.stored(), record);
        assert_eq!(
            record.to_string(),
            format!("{{machine: {MACHINE}, login: alice, secret: {MASK}}}")
        );
        assert_eq!(client.last_password.borrow().as_deref(), Some("p@ss"));
        assert_eq!(prompter.prompt_count(), 0);
    }

    #[test]
    fn test_empty_password_reprompts_until_given() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::returning_key("KEY123");
        let prompter = ScriptedPrompter::new(&[], &["", "", "finalpw"]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        flow.login(Some("alice".to_string()), None).unwrap();

        assert_eq!(prompter.prompt_count(), 3);
        assert_eq!(client.last_password.borrow().as_deref(), Some("finalpw"));
    }

    #[test]
    fn test_prompts_for_username() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::returning_key("KEY123");
        let prompter = ScriptedPrompter::new(&["  alice \n"], &["pw"]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        let record = flow.login(None, None).unwrap();
        assert_eq!(record.login, "alice");
        assert_eq!(client.calls(), vec!["login:alice"]);
    }

    #[test]
    fn test_empty_username_is_fatal() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::returning_key("KEY123");
        let prompter = ScriptedPrompter::new(&["   "], &["pw"]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        assert!(matches!(flow.login(None, None), Err(Error::MissingLoginName)));
        assert_eq!(prompter.prompt_count(), 1);
        assert!(client.calls().is_empty());
        assert_eq!(store.count("save"), 0);
    }

    #[test]
    fn test_tls_failure_becomes_certificate_error() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::failing_login(tls_failure());
        let prompter = ScriptedPrompter::new(&[], &[]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        let err = flow
            .login(Some("alice".to_string()), Some(SecretString::from("pw".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::CertificateVerification { .. }));
        assert_eq!(store.count("save"), 0);
    }

    #[test]
    fn test_tls_failure_with_ca_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(
            &ca,
            "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        let config = config().with_cert_file(&ca);
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::failing_login(tls_failure());
        let prompter = ScriptedPrompter::new(&[], &[]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        let err = flow
            .login(Some("alice".to_string()), Some(SecretString::from("pw".to_string())))
            .unwrap_err();
        assert!(err.is_tls_verification());
    }

    #[test]
    fn test_other_failures_pass_through() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::failing_login(TransportError::from_status(401, "").into());
        let prompter = ScriptedPrompter::new(&[], &[]);
        let flow = LoginFlow::new(&config, TrustOptions::default(), &resolver, &store, &client, &prompter);

        let err = flow
            .login(Some("alice".to_string()), Some(SecretString::from("bad".to_string())))
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn test_conflicting_trust_options_fail_before_network() {
        let config = config();
        let resolver = resolver();
        let store = RecordingStore::new();
        let client = FakeAuthClient::returning_key("KEY123");
        let prompter = ScriptedPrompter::new(&[], &[]);
        let trust = TrustOptions {
            self_signed: true,
            insecure: true,
        };
        let flow = LoginFlow::new(&config, trust, &resolver, &store, &client, &prompter);

        let err = flow
            .login(Some("alice".to_string()), Some(SecretString::from("pw".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingTrustOptions));
        assert!(client.calls().is_empty());
    }
}

use crate::auth::{CredentialRecord, SessionTokenCache};
use crate::client::{AuthClient, RoleId};
use crate::config::{AuthnType, ConnectionConfig};
use crate::error::{Error, Result, TransportError, TransportErrorKind};
use crate::trust::{TrustContext, TrustMode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use std::cell::RefCell;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// `Authorization` header value carrying a session token.
pub fn token_authorization_header(token: &str) -> String {
    format!("Token token=\"{}\"", BASE64.encode(token))
}

/// [`AuthClient`] over the server's HTTP API.
///
/// Calls that act on other roles authenticate with a session token derived
/// from the credentials given to [`HttpAuthClient::with_credentials`].
pub struct HttpAuthClient {
    config: ConnectionConfig,
    trust: TrustContext,
    credentials: Option<CredentialRecord>,
    tokens: RefCell<SessionTokenCache>,
}

impl HttpAuthClient {
    pub fn new(config: ConnectionConfig, trust: TrustContext) -> Self {
        Self {
            config,
            trust,
            credentials: None,
            tokens: RefCell::new(SessionTokenCache::new()),
        }
    }

    pub fn with_credentials(mut self, record: CredentialRecord) -> Self {
        self.credentials = Some(record);
        self
    }

    /// Session token for the stored credentials, fetched at most once per
    /// validity window.
    pub fn access_token(&self) -> Result<String> {
        let record = self.credentials.as_ref().ok_or_else(|| Error::NotLoggedIn {
            machine: self.config.machine(),
        })?;
        self.tokens
            .borrow_mut()
            .get_token(|| self.authenticate(&self.trust, &record.login, record.secret()))
    }

    fn http(&self, trust: &TrustContext) -> Result<Client> {
        let settings = TlsSettings::from_trust(trust)?;
        let mut builder = Client::builder()
            .use_native_tls()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        for cert in settings.roots {
            builder = builder.add_root_certificate(cert);
        }
        builder
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .danger_accept_invalid_hostnames(settings.accept_invalid_hostnames)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))
    }

    fn authenticator_path(&self) -> String {
        match (&self.config.authn_type, &self.config.service_id) {
            (AuthnType::Ldap, Some(service_id)) => {
                format!("authn-ldap/{}", urlencoding::encode(service_id))
            }
            _ => "authn".to_string(),
        }
    }

    fn url(&self, authenticator: &str, tail: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.base_url(),
            authenticator,
            urlencoding::encode(&self.config.account),
            tail
        )
    }
}

/// TLS knobs derived from a [`TrustContext`].
///
/// With native-tls, accepting invalid certificates also skips the hostname
/// check, so self-signed and insecure modes both disable verification.
struct TlsSettings {
    roots: Vec<reqwest::Certificate>,
    accept_invalid_certs: bool,
    accept_invalid_hostnames: bool,
}

impl TlsSettings {
    fn from_trust(trust: &TrustContext) -> Result<Self> {
        let roots = trust
            .anchors()
            .into_iter()
            .map(|pem| {
                reqwest::Certificate::from_pem(pem.as_bytes())
                    .map_err(|e| Error::Configuration(format!("invalid CA certificate: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let (accept_invalid_certs, accept_invalid_hostnames) = match trust.mode {
            TrustMode::SelfSigned | TrustMode::Insecure => (true, true),
            TrustMode::Platform | TrustMode::CaFile(_) => (false, false),
        };
        Ok(Self {
            roots,
            accept_invalid_certs,
            accept_invalid_hostnames,
        })
    }
}

fn send(request: RequestBuilder) -> Result<String> {
    let resp = request.send().map_err(map_reqwest_error)?;
    let status = resp.status();
    let body = resp.text().map_err(map_reqwest_error)?;
    if !status.is_success() {
        tracing::debug!("Server returned {}", status);
        return Err(TransportError::from_status(status.as_u16(), &body).into());
    }
    Ok(body)
}

fn non_empty_secret(body: String, what: &str) -> Result<SecretString> {
    let body = body.trim();
    if body.is_empty() {
        return Err(TransportError::new(
            TransportErrorKind::InvalidResponse,
            format!("server returned an empty {what}"),
        )
        .into());
    }
    Ok(SecretString::from(body.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    let kind = if is_certificate_error(&err) {
        TransportErrorKind::TlsVerification
    } else if err.is_connect() || err.is_timeout() {
        TransportErrorKind::Connection
    } else {
        TransportErrorKind::InvalidResponse
    };
    TransportError::new(kind, err.to_string()).into()
}

/// Walk the error chain looking for a TLS certificate rejection.
fn is_certificate_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let msg = e.to_string().to_ascii_lowercase();
        if msg.contains("certificate")
            || msg.contains("self signed")
            || msg.contains("self-signed")
            || msg.contains("unknownissuer")
        {
            return true;
        }
        current = e.source();
    }
    false
}

impl AuthClient for HttpAuthClient {
    fn login(
        &self,
        trust: &TrustContext,
        identity: &str,
        password: &SecretString,
    ) -> Result<SecretString> {
        let url = self.url(&self.authenticator_path(), "login");
        tracing::debug!("Logging in as {} at {}", identity, url);
        let body = send(
            self.http(trust)?
                .get(&url)
                .basic_auth(identity, Some(password.expose_secret())),
        )?;
        non_empty_secret(body, "API key")
    }

    fn authenticate(
        &self,
        trust: &TrustContext,
        identity: &str,
        api_key: &SecretString,
    ) -> Result<String> {
        let tail = format!("{}/authenticate", urlencoding::encode(identity));
        let url = self.url(&self.authenticator_path(), &tail);
        tracing::debug!("Authenticating {}", identity);
        let body = send(
            self.http(trust)?
                .post(&url)
                .body(api_key.expose_secret().to_string()),
        )?;
        let token = non_empty_secret(body, "session token")?;
        Ok(token.expose_secret().to_string())
    }

    fn rotate_personal_api_key(
        &self,
        identity: &str,
        current_secret: &SecretString,
    ) -> Result<SecretString> {
        let url = self.url("authn", "api_key");
        let body = send(
            self.http(&self.trust)?
                .put(&url)
                .basic_auth(identity, Some(current_secret.expose_secret())),
        )?;
        non_empty_secret(body, "API key")
    }

    fn rotate_other_api_key(&self, target: &RoleId) -> Result<SecretString> {
        let token = self.access_token()?;
        let url = self.url("authn", "api_key");
        let body = send(
            self.http(&self.trust)?
                .put(&url)
                .query(&[("role", target.to_string())])
                .header(
                    reqwest::header::AUTHORIZATION,
                    token_authorization_header(&token),
                ),
        )?;
        non_empty_secret(body, "API key")
    }

    fn change_personal_password(
        &self,
        identity: &str,
        current_secret: &SecretString,
        new_password: &SecretString,
    ) -> Result<()> {
        let url = self.url("authn", "password");
        send(
            self.http(&self.trust)?
                .put(&url)
                .basic_auth(identity, Some(current_secret.expose_secret()))
                .body(new_password.expose_secret().to_string()),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapped(&'static str, Option<Box<Wrapped>>);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.1.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
        }
    }

    fn client(config: ConnectionConfig) -> HttpAuthClient {
        HttpAuthClient::new(config, TrustContext::platform_default())
    }

    fn trust(mode: TrustMode, ca_material: Option<&str>) -> TrustContext {
        TrustContext {
            verify: !matches!(mode, TrustMode::SelfSigned | TrustMode::Insecure),
            ca_material: ca_material.map(str::to_string),
            mode,
        }
    }

    #[test]
    fn test_tls_settings_per_mode() {
        let settings = TlsSettings::from_trust(&TrustContext::platform_default()).unwrap();
        assert!(settings.roots.is_empty());
        assert!(!settings.accept_invalid_certs);
        assert!(!settings.accept_invalid_hostnames);

        for mode in [TrustMode::SelfSigned, TrustMode::Insecure] {
            let settings = TlsSettings::from_trust(&trust(mode, None)).unwrap();
            assert!(settings.roots.is_empty());
            assert!(settings.accept_invalid_certs);
            assert!(settings.accept_invalid_hostnames);
        }
    }

    #[test]
    fn test_tls_settings_reject_garbage_anchor() {
        let ctx = trust(
            TrustMode::CaFile("/etc/ca.pem".into()),
            Some("-----BEGIN CERTIFICATE-----\nnot base64!\n-----END CERTIFICATE-----"),
        );
        assert!(matches!(
            TlsSettings::from_trust(&ctx),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_clients_build_for_every_mode() {
        let config = ConnectionConfig::new("https://host", "myorg").unwrap();
        for mode in [TrustMode::Platform, TrustMode::SelfSigned, TrustMode::Insecure] {
            let ctx = trust(mode, None);
            assert!(client(config.clone()).http(&ctx).is_ok());
        }
    }

    #[test]
    fn test_token_header() {
        assert_eq!(token_authorization_header("abc"), "Token token=\"YWJj\"");
    }

    #[test]
    fn test_urls() {
        let config = ConnectionConfig::new("https://conjur.example.com/", "my org").unwrap();
        let http = client(config.clone());
        assert_eq!(
            http.url(&http.authenticator_path(), "login"),
            "https://conjur.example.com/authn/my%20org/login"
        );

        let http = client(config.with_ldap("corp"));
        assert_eq!(
            http.url(&http.authenticator_path(), "host%2Fapp/authenticate"),
            "https://conjur.example.com/authn-ldap/corp/my%20org/host%2Fapp/authenticate"
        );
    }

    #[test]
    fn test_certificate_error_detection() {
        let err = Wrapped(
            "error sending request",
            Some(Box::new(Wrapped(
                "invalid peer certificate: UnknownIssuer",
                None,
            ))),
        );
        assert!(is_certificate_error(&err));

        let err = Wrapped("connection refused", None);
        assert!(!is_certificate_error(&err));
    }

    #[test]
    fn test_access_token_requires_credentials() {
        let config = ConnectionConfig::new("https://host", "myorg").unwrap();
        assert!(matches!(
            client(config).access_token(),
            Err(Error::NotLoggedIn { .. })
        ));
    }

    #[test]
    fn test_empty_body_is_invalid_response() {
        let err = non_empty_secret("  \n".to_string(), "API key").unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError {
                kind: TransportErrorKind::InvalidResponse,
                ..
            })
        ));
        let key = non_empty_secret("KEY123\n".to_string(), "API key").unwrap();
        assert_eq!(key.expose_secret(), "KEY123");
    }
}

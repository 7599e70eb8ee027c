//! Connection configuration.
//!
//! The client only needs a URL/account/cert-path triple (plus the
//! authenticator to use), resolved with priority:
//! 1. Environment variables (`CONJUR_APPLIANCE_URL`, ...)
//! 2. Config file (`~/.config/conjur/config.toml`)
//!
//! There is no default server; a missing URL or account is an error.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Suffix appended to the server URL to form the credential key ("machine").
pub const MACHINE_SUFFIX: &str = "/authn";

const ENV_URL: &str = "CONJUR_APPLIANCE_URL";
const ENV_ACCOUNT: &str = "CONJUR_ACCOUNT";
const ENV_CERT_FILE: &str = "CONJUR_CERT_FILE";
const ENV_AUTHN_TYPE: &str = "CONJUR_AUTHN_TYPE";
const ENV_SERVICE_ID: &str = "CONJUR_SERVICE_ID";
const ENV_CREDENTIAL_STORE: &str = "CONJUR_CREDENTIAL_STORE";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    connection: Option<ConnectionSection>,
    store: Option<StoreSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ConnectionSection {
    url: Option<String>,
    account: Option<String>,
    cert_file: Option<PathBuf>,
    authn_type: Option<String>,
    service_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StoreSection {
    kind: Option<String>,
    netrc_path: Option<PathBuf>,
}

/// Authenticator used to exchange a password for an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthnType {
    #[default]
    Token,
    Ldap,
}

impl AuthnType {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" | "authn" => Ok(AuthnType::Token),
            "ldap" | "authn-ldap" => Ok(AuthnType::Ldap),
            other => Err(Error::Configuration(format!(
                "unknown authn_type '{other}' (expected 'token' or 'ldap')"
            ))),
        }
    }
}

impl fmt::Display for AuthnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthnType::Token => write!(f, "token"),
            AuthnType::Ldap => write!(f, "ldap"),
        }
    }
}

/// Connection settings for one server. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: Url,
    pub account: String,
    pub cert_file: Option<PathBuf>,
    pub authn_type: AuthnType,
    pub service_id: Option<String>,
}

impl ConnectionConfig {
    pub fn new(url: &str, account: &str) -> Result<Self> {
        let url = Url::parse(url.trim())
            .map_err(|e| Error::Configuration(format!("invalid server URL '{url}': {e}")))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(Error::Configuration(format!(
                "server URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        let account = account.trim();
        if account.is_empty() {
            return Err(Error::Configuration("account must not be empty".to_string()));
        }
        Ok(Self {
            url,
            account: account.to_string(),
            cert_file: None,
            authn_type: AuthnType::Token,
            service_id: None,
        })
    }

    pub fn with_cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(path.into());
        self
    }

    /// Use the LDAP authenticator for `service_id`.
    pub fn with_ldap(mut self, service_id: impl Into<String>) -> Self {
        self.authn_type = AuthnType::Ldap;
        self.service_id = Some(service_id.into());
        self
    }

    /// Server URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// Key identifying the stored credential record for this server.
    pub fn machine(&self) -> String {
        format!("{}{}", self.base_url(), MACHINE_SUFFIX)
    }

    fn apply_authenticator(
        mut self,
        authn_type: Option<&str>,
        service_id: Option<String>,
    ) -> Result<Self> {
        let authn_type = authn_type.map(AuthnType::parse).transpose()?;
        let service_id = service_id.filter(|s| !s.trim().is_empty());
        self.authn_type = match (authn_type, &service_id) {
            (Some(AuthnType::Token), Some(_)) => {
                return Err(Error::Configuration(
                    "service_id is only valid with authn_type 'ldap'".to_string(),
                ));
            }
            (Some(AuthnType::Ldap), None) => {
                return Err(Error::Configuration(
                    "authn_type 'ldap' requires a service_id".to_string(),
                ));
            }
            (None, Some(_)) => AuthnType::Ldap,
            (Some(kind), _) => kind,
            (None, None) => AuthnType::Token,
        };
        self.service_id = service_id;
        Ok(self)
    }
}

/// Which credential store backs this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Keyring,
}

impl StoreKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "netrc" => Ok(StoreKind::File),
            "keyring" | "keystore" => Ok(StoreKind::Keyring),
            other => Err(Error::Configuration(format!(
                "unknown credential store '{other}' (expected 'file' or 'keyring')"
            ))),
        }
    }
}

impl Default for StoreKind {
    fn default() -> Self {
        if cfg!(feature = "keyring-storage") {
            StoreKind::Keyring
        } else {
            StoreKind::File
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::File => write!(f, "file"),
            StoreKind::Keyring => write!(f, "keyring"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Overrides the default credentials file location.
    pub netrc_path: Option<PathBuf>,
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Loaded from environment variables
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Effective configuration for one process invocation.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub connection: ConnectionConfig,
    pub store: StoreSettings,
    pub source: ConfigSource,
}

/// Get the path to the configuration file
pub fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("conjur").join("config.toml"))
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/conjur/config.toml".to_string())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let content = fs::read_to_string(path)?;
    let config = toml::from_str(&content).map_err(|e| {
        Error::Configuration(format!("failed to parse {}: {}", path.display(), e))
    })?;
    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Load the configuration from the process environment and the default file.
pub fn load_config() -> Result<LoadedConfig> {
    let path = get_config_file_path();
    load_config_from(path.as_deref(), |name| std::env::var(name).ok())
}

/// Load the configuration from `path` with `env` as the variable lookup.
pub fn load_config_from<F>(path: Option<&Path>, env: F) -> Result<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let file = match path {
        Some(p) => read_config_file(p)?,
        None => ConfigFile::default(),
    };
    let env = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let section = file.connection.unwrap_or_default();

    let (url, source) = match env(ENV_URL) {
        Some(url) => {
            tracing::info!("Using server URL from environment variable: {}", url);
            (url, ConfigSource::Environment)
        }
        None => match section.url {
            Some(url) => (url, ConfigSource::ConfigFile),
            None => {
                return Err(Error::Configuration(format!(
                    "no server URL configured; set {} or 'url' in {}",
                    ENV_URL,
                    get_config_file_path_string()
                )));
            }
        },
    };
    let account = env(ENV_ACCOUNT).or(section.account).ok_or_else(|| {
        Error::Configuration(format!(
            "no account configured; set {} or 'account' in {}",
            ENV_ACCOUNT,
            get_config_file_path_string()
        ))
    })?;

    let mut connection = ConnectionConfig::new(&url, &account)?;
    connection.cert_file = env(ENV_CERT_FILE).map(PathBuf::from).or(section.cert_file);
    let authn_type = env(ENV_AUTHN_TYPE).or(section.authn_type);
    let service_id = env(ENV_SERVICE_ID).or(section.service_id);
    let connection = connection.apply_authenticator(authn_type.as_deref(), service_id)?;

    let store_section = file.store.unwrap_or_default();
    let kind = match env(ENV_CREDENTIAL_STORE).or(store_section.kind) {
        Some(kind) => StoreKind::parse(&kind)?,
        None => StoreKind::default(),
    };

    Ok(LoadedConfig {
        connection,
        store: StoreSettings {
            kind,
            netrc_path: store_section.netrc_path,
        },
        source,
    })
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Conjur CLI Configuration
# Place this file at: ~/.config/conjur/config.toml

[connection]
url = "https://conjur.example.com"
account = "myorg"
# CA certificate used to verify the server (optional)
# cert_file = "/etc/conjur/conjur-myorg.pem"
# authn_type = "ldap"
# service_id = "my-ldap-service"

[store]
# "keyring" (platform keystore) or "file"
# kind = "keyring"
# netrc_path = "/home/me/.config/conjur/.netrc"
"#
    .to_string()
}

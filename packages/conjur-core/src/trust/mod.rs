//! TLS trust configuration.
//!
//! Decides which certificate authorities the client accepts when talking to
//! the server. Exactly zero or one override may be requested:
//! - an explicit CA file (PEM bundle)
//! - self-signed acceptance
//! - skipping verification entirely (insecure)
//!
//! Without an override the platform trust store is used. Some environments
//! ship an empty default store, so when it holds no anchors the resolver
//! seeds one from the OS keychain (macOS) or a distribution CA bundle (Linux).

mod discovery;

pub use discovery::{LINUX_CA_BUNDLE_PATHS, MACOS_ROOT_KEYCHAIN, PlatformKind};

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// How the trust context was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustMode {
    /// Platform trust store, possibly augmented with discovered anchors.
    Platform,
    /// CA bundle supplied by the user.
    CaFile(PathBuf),
    /// Accept a certificate that does not chain to a trusted root.
    SelfSigned,
    /// No certificate verification at all.
    Insecure,
}

/// Certificate authorities the client will accept. Derived per process,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustContext {
    pub verify: bool,
    /// Additional PEM anchors; `None` means the platform default as-is.
    pub ca_material: Option<String>,
    pub mode: TrustMode,
}

impl TrustContext {
    pub fn platform_default() -> Self {
        Self {
            verify: true,
            ca_material: None,
            mode: TrustMode::Platform,
        }
    }

    pub fn has_explicit_ca_file(&self) -> bool {
        matches!(self.mode, TrustMode::CaFile(_))
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self.mode, TrustMode::Insecure)
    }

    /// Individual PEM certificates of `ca_material`.
    pub fn anchors(&self) -> Vec<&str> {
        self.ca_material
            .as_deref()
            .map(split_pem_certificates)
            .unwrap_or_default()
    }
}

/// Split a PEM bundle into its certificate blocks, dropping anything else.
pub fn split_pem_certificates(bundle: &str) -> Vec<&str> {
    let mut certs = Vec::new();
    let mut rest = bundle;
    while let Some(start) = rest.find(PEM_CERT_BEGIN) {
        let Some(end) = rest[start..].find(PEM_CERT_END) else {
            break;
        };
        let end = start + end + PEM_CERT_END.len();
        certs.push(&rest[start..end]);
        rest = &rest[end..];
    }
    certs
}

/// Trust overrides given on the command line. The CA file comes from the
/// connection configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustOptions {
    pub self_signed: bool,
    pub insecure: bool,
}

impl TrustOptions {
    pub fn resolve(
        &self,
        resolver: &TrustResolver,
        config: &crate::config::ConnectionConfig,
    ) -> Result<TrustContext> {
        resolver.resolve(config.cert_file.as_deref(), self.self_signed, self.insecure)
    }
}

/// Builds a [`TrustContext`] from user options and the platform.
#[derive(Debug, Clone)]
pub struct TrustResolver {
    platform: PlatformKind,
    linux_bundles: Vec<PathBuf>,
    native_anchor_count: Option<usize>,
}

impl Default for TrustResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustResolver {
    pub fn new() -> Self {
        Self::for_platform(PlatformKind::current())
    }

    pub fn for_platform(platform: PlatformKind) -> Self {
        Self {
            platform,
            linux_bundles: LINUX_CA_BUNDLE_PATHS.iter().map(PathBuf::from).collect(),
            native_anchor_count: None,
        }
    }

    /// Replace the ordered list of CA bundle candidates probed on Linux.
    pub fn with_linux_bundles<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.linux_bundles = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Pin the number of anchors in the platform default store instead of
    /// probing it.
    pub fn with_native_anchor_count(mut self, count: usize) -> Self {
        self.native_anchor_count = Some(count);
        self
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    pub fn resolve(
        &self,
        explicit_cert_file: Option<&Path>,
        self_signed: bool,
        insecure: bool,
    ) -> Result<TrustContext> {
        let requested = [explicit_cert_file.is_some(), self_signed, insecure]
            .into_iter()
            .filter(|set| *set)
            .count();
        if requested > 1 {
            return Err(Error::ConflictingTrustOptions);
        }

        if let Some(path) = explicit_cert_file {
            return Self::from_ca_file(path);
        }
        if self_signed {
            tracing::warn!("Accepting a self-signed server certificate");
            return Ok(TrustContext {
                verify: false,
                ca_material: None,
                mode: TrustMode::SelfSigned,
            });
        }
        if insecure {
            tracing::warn!("Server certificate verification is disabled");
            return Ok(TrustContext {
                verify: false,
                ca_material: None,
                mode: TrustMode::Insecure,
            });
        }

        Ok(self.platform_context())
    }

    fn from_ca_file(path: &Path) -> Result<TrustContext> {
        let content = fs::read_to_string(path).map_err(|e| Error::CertificateFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Err(Error::CertificateFile {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }
        if split_pem_certificates(&content).is_empty() {
            return Err(Error::CertificateFile {
                path: path.to_path_buf(),
                reason: "no PEM certificates found".to_string(),
            });
        }
        tracing::debug!("Using CA certificate file {:?}", path);
        Ok(TrustContext {
            verify: true,
            ca_material: Some(content),
            mode: TrustMode::CaFile(path.to_path_buf()),
        })
    }

    fn platform_context(&self) -> TrustContext {
        let native = self
            .native_anchor_count
            .unwrap_or_else(discovery::native_anchor_count);
        if native > 0 {
            tracing::debug!("Platform trust store has {} anchors", native);
            return TrustContext::platform_default();
        }

        tracing::debug!("Platform trust store is empty, discovering anchors for {}", self.platform);
        let ca_material = match self.platform {
            PlatformKind::MacOs => discovery::macos_keychain_anchors(),
            PlatformKind::Linux => discovery::linux_bundle_anchors(&self.linux_bundles),
            PlatformKind::Windows => None,
            PlatformKind::Unknown => {
                tracing::warn!("Unknown platform, no additional trust anchors loaded");
                None
            }
        };
        TrustContext {
            verify: true,
            ca_material,
            mode: TrustMode::Platform,
        }
    }
}

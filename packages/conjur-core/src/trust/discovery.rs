//! Per-platform trust anchor discovery.

use super::split_pem_certificates;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// System root certificate keychain exported on macOS.
pub const MACOS_ROOT_KEYCHAIN: &str = "/System/Library/Keychains/SystemRootCertificates.keychain";

/// Distribution CA bundles, probed in order. First existing file wins.
pub const LINUX_CA_BUNDLE_PATHS: &[&str] = &[
    // Debian/Ubuntu/Gentoo
    "/etc/ssl/certs/ca-certificates.crt",
    // Fedora/RHEL 6
    "/etc/pki/tls/certs/ca-bundle.crt",
    // OpenSUSE
    "/etc/ssl/ca-bundle.pem",
    // OpenELEC
    "/etc/pki/tls/cacert.pem",
    // CentOS/RHEL 7
    "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem",
    // Alpine
    "/etc/ssl/cert.pem",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    MacOs,
    Linux,
    Windows,
    Unknown,
}

impl PlatformKind {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            PlatformKind::MacOs
        } else if cfg!(target_os = "linux") {
            PlatformKind::Linux
        } else if cfg!(target_os = "windows") {
            PlatformKind::Windows
        } else {
            PlatformKind::Unknown
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::MacOs => write!(f, "macOS"),
            PlatformKind::Linux => write!(f, "Linux"),
            PlatformKind::Windows => write!(f, "Windows"),
            PlatformKind::Unknown => write!(f, "unknown platform"),
        }
    }
}

/// Number of anchors the platform default store yields for this process.
pub(super) fn native_anchor_count() -> usize {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::debug!("Error loading platform certificate: {}", err);
    }
    result.certs.len()
}

pub(super) fn macos_keychain_anchors() -> Option<String> {
    let output = match Command::new("security")
        .args(["find-certificate", "-a", "-p", MACOS_ROOT_KEYCHAIN])
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Failed to run keychain export: {}", e);
            return None;
        }
    };
    if !output.status.success() {
        tracing::warn!(
            "Keychain export exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let pem = String::from_utf8_lossy(&output.stdout).into_owned();
    let count = split_pem_certificates(&pem).len();
    if count == 0 {
        tracing::warn!("Keychain export returned no certificates");
        return None;
    }
    tracing::debug!("Loaded {} anchors from {}", count, MACOS_ROOT_KEYCHAIN);
    Some(pem)
}

pub(super) fn linux_bundle_anchors(candidates: &[PathBuf]) -> Option<String> {
    let Some(path) = candidates.iter().find(|p| p.is_file()) else {
        tracing::warn!("No distribution CA bundle found");
        return None;
    };
    match fs::read_to_string(path) {
        Ok(pem) if !split_pem_certificates(&pem).is_empty() => {
            tracing::debug!("Loaded trust anchors from {:?}", path);
            Some(pem)
        }
        Ok(_) => {
            tracing::warn!("CA bundle {:?} contains no certificates", path);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read CA bundle {:?}: {}", path, e);
            None
        }
    }
}

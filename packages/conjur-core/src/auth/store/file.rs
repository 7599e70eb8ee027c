//! File-based credential storage.
//!
//! The file holds exactly three lines, in order:
//!
//! ```text
//! machine https://conjur.example.com/authn
//! login alice
//! password 3ahcddy39rcxzh3ggac4cwk3j2r8pqwdg33059y835ys2rh2kzs2a
//! ```
//!
//! Permissions are reset to owner-only on every write.

use crate::auth::CredentialRecord;
use crate::auth::store::CredentialStore;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use secrecy::SecretString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const KEYS: [&str; 3] = ["machine", "login", "password"];

#[cfg(unix)]
const FILE_MODE: u32 = 0o700;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store at `~/.config/conjur/.netrc`.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or_else(|| Error::Configuration("Failed to find config directory".to_string()))?;
        Ok(Self::at(config_dir.join("conjur").join(".netrc")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::CredentialsFileMalformed {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_record(&self) -> Result<CredentialRecord> {
        if !self.path.exists() {
            return Err(self.malformed("file does not exist"));
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(self.malformed("file is not valid UTF-8"));
            }
            Err(e) => return Err(e.into()),
        };
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return Err(self.malformed("file is empty"));
        }
        if lines.len() != KEYS.len() {
            return Err(self.malformed(format!(
                "expected {} lines, found {}",
                KEYS.len(),
                lines.len()
            )));
        }

        let mut values = Vec::with_capacity(KEYS.len());
        for (index, (line, expected)) in lines.iter().zip(KEYS).enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [key, value] if *key == expected => values.push(*value),
                _ => {
                    return Err(self.malformed(format!(
                        "line {} must be '{} <value>'",
                        index + 1,
                        expected
                    )));
                }
            }
        }
        Ok(CredentialRecord::new(values[0], values[1], values[2]))
    }

    fn write_content(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(FILE_MODE);
        }
        let written = options
            .open(&tmp_path)
            .and_then(|mut file| {
                file.write_all(content.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                tracing::debug!("Failed to remove {:?}: {}", tmp_path, cleanup);
            }
            return Err(e.into());
        }
        self.harden_permissions()
    }

    /// Every field must be a single non-empty token to survive a reload.
    fn check_storable(record: &CredentialRecord) -> Result<()> {
        let fields = [
            (KEYS[0], record.machine.as_str()),
            (KEYS[1], record.login.as_str()),
            (KEYS[2], record.expose_secret()),
        ];
        for (field, value) in fields {
            let reason = if value.is_empty() {
                "is empty"
            } else if value.chars().any(char::is_whitespace) {
                "contains whitespace"
            } else {
                continue;
            };
            return Err(Error::UnstorableCredentials { field, reason });
        }
        Ok(())
    }

    fn truncate(&self) -> Result<()> {
        fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.harden_permissions()
    }

    fn harden_permissions(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(FILE_MODE))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn save(&self, record: &CredentialRecord) -> Result<()> {
        Self::check_storable(record)?;
        let content = format!(
            "{} {}\n{} {}\n{} {}\n",
            KEYS[0],
            record.machine,
            KEYS[1],
            record.login,
            KEYS[2],
            record.expose_secret()
        );
        self.write_content(&content)?;
        tracing::debug!("Credentials saved to file: {:?}", self.path);
        Ok(())
    }

    fn load(&self, machine: &str) -> Result<CredentialRecord> {
        let record = self.read_record()?;
        if record.machine != machine {
            tracing::debug!(
                "Credentials file holds {} but {} was requested",
                record.machine,
                machine
            );
            return Err(Error::NotLoggedIn {
                machine: machine.to_string(),
            });
        }
        tracing::debug!("Credentials loaded from file");
        Ok(record)
    }

    fn is_exists(&self, machine: &str) -> Result<bool> {
        match self.read_record() {
            Ok(record) => Ok(record.machine == machine && record.is_complete()),
            Err(Error::CredentialsFileMalformed { reason, .. }) => {
                tracing::debug!("No usable credentials file: {}", reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn update_api_key_entry(
        &self,
        login: &str,
        record: &CredentialRecord,
        new_secret: &SecretString,
    ) -> Result<()> {
        self.save(&record.rotated(login, new_secret))
    }

    fn remove_credentials(&self, config: &ConnectionConfig) -> Result<()> {
        if self.path.exists() {
            self.truncate()?;
        }
        tracing::debug!("Credentials for {} removed from {:?}", config.machine(), self.path);
        Ok(())
    }

    fn cleanup_if_exists(&self, machine: &str) -> Result<()> {
        let has_content = fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !has_content {
            return Ok(());
        }
        match self.read_record() {
            Ok(record) if record.machine != machine => {
                tracing::debug!("Credentials file belongs to {}, leaving it", record.machine);
                return Ok(());
            }
            Ok(_) | Err(Error::CredentialsFileMalformed { .. }) => {}
            Err(e) => {
                tracing::warn!("Failed to inspect credentials file: {}", e);
                return Ok(());
            }
        }
        match self.truncate() {
            Ok(()) => tracing::warn!("Removed leftover credentials for {}", machine),
            Err(e) => tracing::warn!("Failed to clean up credentials file: {}", e),
        }
        Ok(())
    }

    fn store_location(&self) -> String {
        self.path.display().to_string()
    }
}

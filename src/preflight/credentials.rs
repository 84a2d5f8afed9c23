//! Stored provider credentials.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;

use crate::provider::ProviderId;

/// Errors from reading a credentials file.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to read credentials file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse credentials file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Source of secrets for providers that authenticate with a key.
pub trait CredentialStore: Send + Sync {
    /// The stored credential for `provider`, if any.
    fn lookup(&self, provider: ProviderId) -> Option<String>;
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<ProviderId, String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, provider: ProviderId, secret: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, secret.into());
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, provider: ProviderId) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .filter(|s| !s.is_empty())
            .cloned()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialsFile {
    credentials: HashMap<String, String>,
}

/// Read-only store backed by a TOML file:
///
/// ```toml
/// [credentials]
/// codex = "sk-..."
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: HashMap<ProviderId, String>,
}

impl FileCredentialStore {
    /// `~/.config/agent-terminal/credentials.toml`, when a config dir exists.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("agent-terminal").join("credentials.toml"))
    }

    /// Load the file at `path`. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No credentials file");
            return Ok(Self {
                path,
                entries: HashMap::new(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| CredentialError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        let file: CredentialsFile =
            toml::from_str(&content).map_err(|e| CredentialError::ParseError {
                path: path.clone(),
                source: e,
            })?;

        let entries: HashMap<ProviderId, String> = file
            .credentials
            .into_iter()
            .filter_map(|(key, secret)| match key.parse::<ProviderId>() {
                Ok(id) => Some((id, secret)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring credential entry");
                    None
                }
            })
            .collect();

        tracing::debug!(path = %path.display(), count = entries.len(), "Loaded credentials");
        Ok(Self { path, entries })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn lookup(&self, provider: ProviderId) -> Option<String> {
        self.entries
            .get(&provider)
            .filter(|s| !s.trim().is_empty())
            .cloned()
    }
}

//! On-disk JSON stores for credentials and the global config.
//!
//! Every write goes to a temporary file in the target directory which is
//! then renamed over the destination, so readers see either the old or the
//! new document and never a partial one. Nothing is cached between calls:
//! the CLI and a running bridge may both touch these files, and the last
//! writer wins at file granularity.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::Credentials;
use crate::config::Config;
use crate::error::StoreError;

/// Permission class applied to a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Owner read/write only (`0600`).
    Private,
    /// World-readable, owner-writable (`0644`).
    Shared,
}

impl FileMode {
    #[cfg(unix)]
    const fn bits(self) -> u32 {
        match self {
            Self::Private => 0o600,
            Self::Shared => 0o644,
        }
    }
}

/// A single JSON document on disk with atomic replace-write semantics.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
    mode: FileMode,
}

impl JsonFile {
    /// Creates a handle for `path`. Nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and decodes the document.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn read<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                source: e,
            })
    }

    /// Atomically replaces the document with `value`.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or any filesystem step fails.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialise {
            path: self.path.clone(),
            source: e,
        })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        temp.write_all(json.as_bytes()).map_err(write_err)?;
        temp.write_all(b"\n").map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(self.mode.bits());
            std::fs::set_permissions(temp.path(), perms).map_err(write_err)?;
        }

        temp.persist(&self.path).map_err(|e| write_err(e.error))?;

        tracing::debug!(path = %self.path.display(), "Stored file replaced");
        Ok(())
    }

    /// Deletes the document.
    ///
    /// Returns `true` if a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<bool, StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Write {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

/// Persisted session credentials (`credentials.json`, owner-only).
#[derive(Debug, Clone)]
pub struct CredentialStore {
    file: JsonFile,
}

impl CredentialStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path, FileMode::Private),
        }
    }

    /// Path of the credentials file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Loads the stored credentials, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed.
    pub fn load(&self) -> Result<Option<Credentials>, StoreError> {
        self.file.read()
    }

    /// Replaces the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        self.file.write(credentials)
    }

    /// Deletes the stored credentials. Returns `true` if a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool, StoreError> {
        self.file.remove()
    }

    /// [`CredentialStore::load`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// As for `load`, or `Task` if the blocking task fails.
    pub async fn load_async(&self) -> Result<Option<Credentials>, StoreError> {
        self.off_runtime(Self::load).await
    }

    /// [`CredentialStore::save`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// As for `save`, or `Task` if the blocking task fails.
    pub async fn save_async(&self, credentials: Credentials) -> Result<(), StoreError> {
        self.off_runtime(move |store| store.save(&credentials)).await
    }

    /// [`CredentialStore::clear`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// As for `clear`, or `Task` if the blocking task fails.
    pub async fn clear_async(&self) -> Result<bool, StoreError> {
        self.off_runtime(Self::clear).await
    }

    // Request tasks share one current-thread runtime; file IO must not stall it.
    async fn off_runtime<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || op(&store)).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Task {
                path: self.path().to_path_buf(),
                source: e,
            }),
        }
    }
}

/// The global config file, read and written for the cached workspace alias.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    file: JsonFile,
}

impl ConfigStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path, FileMode::Shared),
        }
    }

    /// Path of the config file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Loads the config, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed.
    pub fn load(&self) -> Result<Config, StoreError> {
        Ok(self.file.read()?.unwrap_or_default())
    }

    /// Returns the cached workspace alias.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or malformed.
    pub fn workspace_alias(&self) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.workspace_alias)
    }

    /// Sets (or clears) the cached workspace alias, keeping every other field.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read back or written.
    pub fn set_workspace_alias(&self, alias: Option<&str>) -> Result<(), StoreError> {
        let mut config = self.load()?;
        let alias = alias.map(str::to_string);
        if config.workspace_alias == alias {
            return Ok(());
        }
        config.workspace_alias = alias;
        self.file.write(&config)
    }
}

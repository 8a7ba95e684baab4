// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable single-record credential store with atomic writes.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::issuer::TokenGrant;
use super::{now_ms, Credential};
use crate::error::AuthError;

/// Failure writing or removing the persisted record.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
    /// An update arrived when no complete credential was stored.
    NotConnected,
    /// The stored credential was replaced while a refresh was in flight.
    Superseded,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "credential store I/O failed: {e}"),
            Self::Serialize(e) => write!(f, "credential serialization failed: {e}"),
            Self::NotConnected => f.write_str("no credential to update"),
            Self::Superseded => f.write_str("credential was replaced during refresh"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotConnected => {
                AuthError::ReauthenticationRequired("credential was cleared during refresh".into())
            }
            StoreError::Superseded => {
                AuthError::TemporarilyUnavailable("credential was replaced during refresh".into())
            }
            other => AuthError::Storage(other.to_string()),
        }
    }
}

/// Owner of the one process-wide [`Credential`].
///
/// Reads come from the in-memory copy. Mutations are serialized through a
/// write gate, persisted first, and only then become visible to readers.
pub struct CredentialStore {
    path: PathBuf,
    cached: RwLock<Credential>,
    write_gate: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    /// Read the persisted record at `path`.
    ///
    /// An absent, unreadable, or incomplete record yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let credential = read_record(&path).unwrap_or_default();
        Self { path, cached: RwLock::new(credential), write_gate: tokio::sync::Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the in-memory credential. Never touches the disk.
    pub fn current(&self) -> Credential {
        self.cached.read().clone()
    }

    /// Replace the stored credential with `credential`.
    pub async fn save(&self, credential: Credential) -> Result<Credential, StoreError> {
        let _gate = self.write_gate.lock().await;
        write_record(&self.path, &credential)?;
        *self.cached.write() = credential.clone();
        debug!(path = %self.path.display(), realm_id = ?credential.realm_id, "saved credential");
        Ok(credential)
    }

    /// Merge a refresh result obtained with `used_refresh_token` into the
    /// stored credential.
    ///
    /// The realm id is kept, and the refresh token is kept unless the grant
    /// carries a new one. Fails with [`StoreError::NotConnected`] if the
    /// credential was cleared in the meantime, or [`StoreError::Superseded`]
    /// if it no longer holds `used_refresh_token`.
    pub async fn update(
        &self,
        grant: &TokenGrant,
        used_refresh_token: &str,
    ) -> Result<Credential, StoreError> {
        let _gate = self.write_gate.lock().await;
        let current = self.cached.read().clone();
        if !current.is_complete() {
            return Err(StoreError::NotConnected);
        }
        if current.refresh_token.as_deref() != Some(used_refresh_token) {
            return Err(StoreError::Superseded);
        }
        let merged = current.merged_with(grant, now_ms());
        write_record(&self.path, &merged)?;
        *self.cached.write() = merged.clone();
        debug!(path = %self.path.display(), expires_at = ?merged.expires_at, "updated credential");
        Ok(merged)
    }

    /// Forget the credential in memory and on disk.
    ///
    /// Removing a record that does not exist succeeds.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.clear_locked()
    }

    /// Clear only if the stored credential still holds `refresh_token`.
    ///
    /// Returns whether anything was cleared.
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool, StoreError> {
        let _gate = self.write_gate.lock().await;
        if self.cached.read().refresh_token.as_deref() != Some(refresh_token) {
            return Ok(false);
        }
        self.clear_locked()?;
        Ok(true)
    }

    fn clear_locked(&self) -> Result<(), StoreError> {
        *self.cached.write() = Credential::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "cleared credential");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_record(path: &Path) -> Option<Credential> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            debug!(path = %path.display(), "no persisted credential: {e}");
            return None;
        }
    };
    let credential: Credential = match serde_json::from_str(&data) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), "failed to parse persisted credential: {e}");
            return None;
        }
    };
    if !credential.is_complete() {
        warn!(path = %path.display(), "persisted credential is incomplete, ignoring");
        return None;
    }
    info!(path = %path.display(), realm_id = ?credential.realm_id, "loaded persisted credential");
    Some(credential)
}

/// Atomic write: temp file in the target directory, fsync, then rename over.
///
/// The temp file is created with mode 0600 and removed if any step fails.
fn write_record(path: &Path, credential: &Credential) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(credential)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// crates/sqlgate-server/src/secrets.rs
// ============================================================================
// Module: Secret Stores
// Description: Watchable secret values backing rotating source connections.
// Purpose: Deliver the current connection string and every later rotation.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! A [`SecretStore`] hands out [`watch::Receiver`]s whose value is the current
//! secret. The receiver's current value is the initial connection string; each
//! later change is a rotation. [`DirectorySecretStore`] reads one file per
//! secret and polls for changes; [`MemorySecretStore`] is set programmatically.
//!
//! Security posture: secret names are untrusted config input and must not
//! escape the store directory. Secret values are never logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::error::GatewayError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum secret file size in bytes.
const MAX_SECRET_BYTES: u64 = 64 * 1024;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Source of rotating secret values.
pub trait SecretStore: Send + Sync {
    /// Subscribes to `name`. The receiver's current value is the secret now.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the secret is unknown or unreadable.
    fn subscribe(&self, name: &str) -> Result<watch::Receiver<Vec<u8>>, GatewayError>;
}

/// Watch senders keyed by secret name.
type Watchers = Mutex<BTreeMap<String, watch::Sender<Vec<u8>>>>;

/// Locks `watchers`, recovering from poisoning.
fn lock(watchers: &Watchers) -> MutexGuard<'_, BTreeMap<String, watch::Sender<Vec<u8>>>> {
    watchers.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SECTION: Memory Store
// ============================================================================

/// In-process secret store.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    /// Current values.
    watchers: Watchers,
}

impl MemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, notifying subscribers when it changed.
    pub fn put(&self, name: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        let mut watchers = lock(&self.watchers);
        if let Some(sender) = watchers.get(name) {
            sender.send_if_modified(|current| replace_if_changed(current, value));
        } else {
            watchers.insert(name.to_string(), watch::Sender::new(value));
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn subscribe(&self, name: &str) -> Result<watch::Receiver<Vec<u8>>, GatewayError> {
        lock(&self.watchers)
            .get(name)
            .map(watch::Sender::subscribe)
            .ok_or_else(|| GatewayError::Config(format!("secret \"{name}\" not found")))
    }
}

// ============================================================================
// SECTION: Directory Store
// ============================================================================

/// Secret store backed by one file per secret in a directory.
///
/// # Invariants
/// - Only names without path separators are read.
/// - A failed re-read keeps the last good value.
#[derive(Debug)]
pub struct DirectorySecretStore {
    /// Store directory.
    dir: PathBuf,
    /// Poll period.
    poll_interval: Duration,
    /// Subscribed secrets.
    watchers: Watchers,
}

impl DirectorySecretStore {
    /// Creates a store over `dir` polled every `poll_interval`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            watchers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-reads every subscribed secret once, returning how many changed.
    pub fn poll_once(&self) -> usize {
        let watchers = lock(&self.watchers);
        let mut changed = 0;
        for (name, sender) in watchers.iter() {
            match read_secret(&self.dir, name) {
                Ok(value) => {
                    if sender.send_if_modified(|current| replace_if_changed(current, value)) {
                        debug!(secret = %name, "secret rotated");
                        changed += 1;
                    }
                }
                Err(err) => warn!(secret = %name, error = %err, "secret re-read failed"),
            }
        }
        changed
    }

    /// Spawns the polling task. The task ends once the store is dropped.
    #[must_use]
    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let period = self.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(strong) = store.upgrade() else {
                    return;
                };
                if tokio::task::spawn_blocking(move || strong.poll_once()).await.is_err() {
                    return;
                }
            }
        })
    }
}

impl SecretStore for DirectorySecretStore {
    fn subscribe(&self, name: &str) -> Result<watch::Receiver<Vec<u8>>, GatewayError> {
        let mut watchers = lock(&self.watchers);
        if let Some(sender) = watchers.get(name) {
            return Ok(sender.subscribe());
        }
        let value = read_secret(&self.dir, name)?;
        let sender = watch::Sender::new(value);
        let receiver = sender.subscribe();
        watchers.insert(name.to_string(), sender);
        Ok(receiver)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Stores `value` into `current` when it differs.
fn replace_if_changed(current: &mut Vec<u8>, value: Vec<u8>) -> bool {
    if *current == value {
        return false;
    }
    *current = value;
    true
}

/// Reads secret `name` from `dir`.
fn read_secret(dir: &Path, name: &str) -> Result<Vec<u8>, GatewayError> {
    validate_name(name)?;
    let path = dir.join(name);
    let metadata = std::fs::metadata(&path)
        .map_err(|err| GatewayError::Config(format!("secret \"{name}\": {err}")))?;
    if !metadata.is_file() {
        return Err(GatewayError::Config(format!("secret \"{name}\" is not a file")));
    }
    if metadata.len() > MAX_SECRET_BYTES {
        return Err(GatewayError::Config(format!("secret \"{name}\" exceeds size limit")));
    }
    std::fs::read(&path).map_err(|err| GatewayError::Config(format!("secret \"{name}\": {err}")))
}

/// Rejects names that could address files outside the store.
fn validate_name(name: &str) -> Result<(), GatewayError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(GatewayError::Config(format!("invalid secret name \"{name}\"")));
    }
    Ok(())
}

/// Decodes a secret value into a connection string.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] when the value is not UTF-8 or is blank.
pub fn connection_string(name: &str, value: &[u8]) -> Result<String, GatewayError> {
    let text = std::str::from_utf8(value)
        .map_err(|_| GatewayError::Config(format!("secret \"{name}\" is not UTF-8")))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(GatewayError::Config(format!("secret \"{name}\" is empty")));
    }
    Ok(text.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::*;

    #[test]
    fn memory_store_notifies_only_on_change() {
        let store = MemorySecretStore::new();
        store.put("db", "file:a.db");
        let mut rx = store.subscribe("db").unwrap();
        assert_eq!(rx.borrow_and_update().as_slice(), b"file:a.db");
        store.put("db", "file:a.db");
        assert!(!rx.has_changed().unwrap());
        store.put("db", "file:b.db");
        assert!(rx.has_changed().unwrap());
        assert!(store.subscribe("other").is_err());
    }

    #[test]
    fn directory_store_polls_for_rotation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db"), "file:a.db\n").unwrap();
        let store = DirectorySecretStore::new(dir.path(), Duration::from_secs(1));
        let mut rx = store.subscribe("db").unwrap();
        assert_eq!(connection_string("db", &rx.borrow_and_update()).unwrap(), "file:a.db");
        assert_eq!(store.poll_once(), 0);
        std::fs::write(dir.path().join("db"), "file:b.db\n").unwrap();
        assert_eq!(store.poll_once(), 1);
        assert_eq!(connection_string("db", &rx.borrow_and_update()).unwrap(), "file:b.db");
    }

    #[test]
    fn directory_store_keeps_value_when_file_disappears() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db"), "file:a.db").unwrap();
        let store = DirectorySecretStore::new(dir.path(), Duration::from_secs(1));
        let rx = store.subscribe("db").unwrap();
        std::fs::remove_file(dir.path().join("db")).unwrap();
        assert_eq!(store.poll_once(), 0);
        assert_eq!(rx.borrow().as_slice(), b"file:a.db");
    }

    #[test]
    fn names_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectorySecretStore::new(dir.path(), Duration::from_secs(1));
        for name in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(store.subscribe(name).is_err(), "\"{name}\" accepted");
        }
    }

    #[test]
    fn blank_secret_is_rejected() {
        assert!(connection_string("db", b"  \n").is_err());
        assert!(connection_string("db", &[0xff]).is_err());
    }
}

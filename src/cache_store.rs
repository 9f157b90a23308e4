//! Durable storage for the in-app message cache.
//!
//! [`CacheStore`] keeps the current [`CacheState`] in memory and writes every change through to a
//! [`Storage`] backend. Readers get a snapshot that is not affected by further writes. Storage
//! failures never reach the caller: a missing or corrupt cache loads as the empty state and a
//! failed write is logged.
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    events::Campaign,
    inbox::{deserialize_inbox, InboxMessage},
    message::{deserialize_messages, InAppMessage, Timestamp},
    Result,
};

/// Process-wide persisted state of the in-app engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheState {
    /// Cached in-app messages, in fetch order.
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<InAppMessage>,
    /// Instant of the last successful fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch_time: Option<Timestamp>,
    /// Global cooldown: no message may be shown before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_show_time: Option<Timestamp>,
    /// Campaign the following events are attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<Campaign>,
    /// Messages saved to the inbox.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_inbox"
    )]
    pub inbox: Vec<InboxMessage>,
}

impl CacheState {
    /// Cached message with `message_id`.
    pub fn message(&self, message_id: &str) -> Option<&InAppMessage> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }

    /// Replace the message with the same id, or append it.
    pub fn upsert_message(&mut self, message: InAppMessage) {
        match self
            .messages
            .iter_mut()
            .find(|m| m.message_id == message.message_id)
        {
            Some(slot) => *slot = message,
            None => self.messages.push(message),
        }
    }

    /// Returns `true` if a message was removed.
    pub fn remove_message(&mut self, message_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.message_id != message_id);
        self.messages.len() != before
    }

    /// Drop messages that can never be shown again.
    pub fn prune_expired(&mut self, now: Timestamp) {
        self.messages.retain(|m| !m.is_expired(now));
    }
}

/// Byte-level persistence backend for [`CacheStore`].
///
/// `write` must be atomic with respect to `read`: a reader observes either the previous or the
/// new contents, never a partial write.
pub trait Storage: Send + Sync {
    /// Returns `Ok(None)` if nothing has been stored yet.
    fn read(&self) -> std::io::Result<Option<Vec<u8>>>;

    /// Replace the stored bytes.
    fn write(&self, bytes: &[u8]) -> std::io::Result<()>;
}

/// Stores the cache as a JSON file. Writes go to a temp file in the same directory, get fsynced,
/// then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Creates the parent directory if it does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<FileStorage> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(FileStorage { path })
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut file_name = std::ffi::OsString::from(".");
        file_name.push(self.path.file_name().unwrap_or_default());
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

impl Storage for FileStorage {
    fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        let tmp_path = self.tmp_path();
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)
    }
}

/// Keeps the cache in memory only. Useful for tests and for hosts without a writable directory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        let bytes = self
            .bytes
            .lock()
            .expect("thread holding storage lock should not panic");
        Ok(bytes.clone())
    }

    fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut slot = self
            .bytes
            .lock()
            .expect("thread holding storage lock should not panic");
        *slot = Some(bytes.to_vec());
        Ok(())
    }
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        (**self).read()
    }

    fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).write(bytes)
    }
}

impl<T: Storage + ?Sized> Storage for Box<T> {
    fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
        (**self).read()
    }

    fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).write(bytes)
    }
}

/// In-memory snapshot of [`CacheState`] backed by a [`Storage`].
pub struct CacheStore {
    storage: Box<dyn Storage>,
    state: RwLock<Arc<CacheState>>,
}

impl CacheStore {
    /// Open the store, loading whatever state `storage` holds.
    pub fn open(storage: impl Storage + 'static) -> CacheStore {
        let storage: Box<dyn Storage> = Box::new(storage);
        let state = load_from(&*storage);
        CacheStore {
            storage,
            state: RwLock::new(Arc::new(state)),
        }
    }

    /// Read the durable state. Falls back to the empty state if storage is absent or corrupt.
    pub fn load(&self) -> CacheState {
        load_from(&*self.storage)
    }

    /// Persist `state` and make it the current snapshot. A failed write is logged; the in-memory
    /// snapshot is updated regardless so the running engine stays consistent.
    pub fn save(&self, state: CacheState) {
        match serde_json::to_vec(&state) {
            Ok(bytes) => {
                if let Err(err) = self.storage.write(&bytes) {
                    log::warn!(target: "dengage",
                               "failed to persist in-app message cache: {err}");
                }
            }
            Err(err) => {
                log::warn!(target: "dengage", "failed to serialize in-app message cache: {err}");
            }
        }

        let new_value = Arc::new(state);
        let mut slot = self
            .state
            .write()
            .expect("thread holding cache lock should not panic");
        *slot = new_value;
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<CacheState> {
        let state = self
            .state
            .read()
            .expect("thread holding cache lock should not panic");
        Arc::clone(&state)
    }

    /// Apply `f` to a copy of the current state and save the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> R {
        let mut state = CacheState::clone(&self.state());
        let result = f(&mut state);
        self.save(state);
        result
    }

    /// Copy of the cached messages.
    pub fn messages(&self) -> Vec<InAppMessage> {
        self.state().messages.clone()
    }

    /// Instant of the last successful fetch.
    pub fn last_fetch_time(&self) -> Option<Timestamp> {
        self.state().last_fetch_time
    }

    /// Persist the instant of the last successful fetch.
    pub fn set_last_fetch_time(&self, value: Option<Timestamp>) {
        self.update(|state| state.last_fetch_time = value);
    }

    /// Global cooldown: no message may be shown before this instant.
    pub fn next_show_time(&self) -> Option<Timestamp> {
        self.state().next_show_time
    }

    /// Persist the global cooldown.
    pub fn set_next_show_time(&self, value: Option<Timestamp>) {
        self.update(|state| state.next_show_time = value);
    }
}

fn load_from(storage: &dyn Storage) -> CacheState {
    let bytes = match storage.read() {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            log::debug!(target: "dengage", "no in-app message cache found, starting empty");
            return CacheState::default();
        }
        Err(err) => {
            log::warn!(target: "dengage",
                       "failed to read in-app message cache, starting empty: {err}");
            return CacheState::default();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        log::warn!(target: "dengage",
                   "in-app message cache is corrupt, starting empty: {err}");
        CacheState::default()
    })
}

//! The transactional store: an embedded `SurrealKV` engine plus the
//! base-directory advisory lock and persisted id counters described in
//! `spec.md` §6 ("Persisted state layout").

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rand::Rng;

use crate::error::{StorageError, StorageResult};
use crate::keys::{COUNTER_EVENT, COUNTER_HANDLE, COUNTER_SESSION, META_GENERATION};
use crate::txn::Transaction;

const LOCK_FILE_NAME: &str = "hyperspace.lock";

/// The embedded transactional key-value store backing the whole service.
///
/// Holds a host-level advisory lock on its base directory for the
/// lifetime of the process, preventing a second server instance from
/// starting against the same state (`spec.md` §9, Design Note on crash
/// recovery).
pub struct Store {
    engine: surrealkv::Store,
    base_dir: PathBuf,
    _advisory_lock: File,
}

impl Store {
    /// Open (creating if necessary) the store rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BaseDirectory`] if `base_dir` cannot be
    /// created or is already locked by another process, or
    /// [`StorageError::Engine`] if the embedded engine fails to open.
    pub fn open(base_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .map_err(|e| StorageError::BaseDirectory(e.to_string()))?;

        let lock_path = base_dir.join(LOCK_FILE_NAME);
        let lock_file = File::create(&lock_path)
            .map_err(|e| StorageError::BaseDirectory(e.to_string()))?;
        lock_file.try_lock_exclusive().map_err(|_| {
            StorageError::BaseDirectory(format!(
                "base directory {} is locked by another Hyperspace process",
                base_dir.display()
            ))
        })?;

        let mut options = surrealkv::Options::new();
        options.dir = base_dir.clone();
        let engine =
            surrealkv::Store::new(options).map_err(|e| StorageError::Engine(e.to_string()))?;

        Ok(Self { engine, base_dir, _advisory_lock: lock_file })
    }

    /// Open a store in a fresh temporary directory, for tests. The
    /// directory is not cleaned up; callers that care should wrap this
    /// in their own tempdir management.
    ///
    /// # Errors
    ///
    /// As [`Self::open`].
    pub fn open_ephemeral_for_tests() -> StorageResult<Self> {
        let suffix: u64 = rand::thread_rng().gen();
        let dir = std::env::temp_dir().join(format!("hyperspace-test-{suffix:016x}"));
        Self::open(dir)
    }

    /// The directory this store's files live under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Begin a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] if the engine cannot start a
    /// transaction.
    pub fn begin(&self) -> StorageResult<Transaction<'_>> {
        self.engine
            .begin()
            .map(Transaction::new)
            .map_err(|e| StorageError::Engine(e.to_string()))
    }

    /// Allocate the next value of a monotonic, persisted counter.
    ///
    /// This runs its own single-key transaction; callers needing the
    /// allocation atomic with other writes should instead read-modify-write
    /// the counter key directly within their own transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] or [`StorageError::Conflict`] on
    /// failure; conflicts here are rare since counters are typically only
    /// contended under heavy concurrent session/handle/event creation.
    pub fn next_counter(&self, counter_key: &[u8]) -> StorageResult<u64> {
        let mut txn = self.begin()?;
        let current = read_u64(&mut txn, counter_key)?.unwrap_or(0);
        let next = current + 1;
        txn.put(counter_key, &next.to_be_bytes())?;
        txn.commit()?;
        Ok(next)
    }

    /// Allocate the next session id.
    ///
    /// # Errors
    ///
    /// As [`Self::next_counter`].
    pub fn next_session_id(&self) -> StorageResult<u64> {
        self.next_counter(COUNTER_SESSION)
    }

    /// Allocate the next handle id.
    ///
    /// # Errors
    ///
    /// As [`Self::next_counter`].
    pub fn next_handle_id(&self) -> StorageResult<u64> {
        self.next_counter(COUNTER_HANDLE)
    }

    /// Allocate the next event id.
    ///
    /// # Errors
    ///
    /// As [`Self::next_counter`].
    pub fn next_event_id(&self) -> StorageResult<u64> {
        self.next_counter(COUNTER_EVENT)
    }

    /// Read the base directory's generation counter, the value exposed as
    /// an xattr on `/hyperspace/metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] on an underlying engine failure.
    pub fn generation(&self) -> StorageResult<u64> {
        let mut txn = self.begin()?;
        let value = read_u64(&mut txn, META_GENERATION)?.unwrap_or(0);
        txn.commit()?;
        Ok(value)
    }

    /// Increment and persist the base directory's generation counter.
    /// Called once at startup after recovering from a prior run, so every
    /// lock generation issued this run is distinguishable from the last.
    ///
    /// # Errors
    ///
    /// As [`Self::next_counter`].
    pub fn bump_generation(&self) -> StorageResult<u64> {
        self.next_counter(META_GENERATION)
    }
}

pub(crate) fn read_u64(txn: &mut Transaction<'_>, key: &[u8]) -> StorageResult<Option<u64>> {
    match txn.get(key)? {
        Some(bytes) if bytes.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes);
            Ok(Some(u64::from_be_bytes(buf)))
        }
        Some(_) => Err(StorageError::Serialization(format!(
            "counter at key of unexpected length (key len {})",
            key.len()
        ))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_monotonically() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        assert_eq!(store.next_session_id().unwrap(), 1);
        assert_eq!(store.next_session_id().unwrap(), 2);
        assert_eq!(store.next_handle_id().unwrap(), 1);
    }

    #[test]
    fn generation_persists_across_bumps() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        assert_eq!(store.generation().unwrap(), 0);
        assert_eq!(store.bump_generation().unwrap(), 1);
        assert_eq!(store.generation().unwrap(), 1);
    }

    #[test]
    fn a_second_store_cannot_open_the_same_directory() {
        let suffix: u64 = rand::thread_rng().gen();
        let dir = std::env::temp_dir().join(format!("hyperspace-test-lock-{suffix:016x}"));
        let _first = Store::open(&dir).unwrap();
        assert!(Store::open(&dir).is_err());
    }
}

//! A thin transaction wrapper over the embedded engine, so every caller
//! goes through one `get`/`put`/`delete`/`scan_prefix` surface rather than
//! depending on `surrealkv` types directly.

use crate::error::{StorageError, StorageResult};

/// A single serialisable transaction against the store.
///
/// Dropped without a `commit` call, the transaction is rolled back: no
/// partial writes are ever visible to a later transaction.
pub struct Transaction<'s> {
    inner: surrealkv::Transaction,
    _store: std::marker::PhantomData<&'s ()>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(inner: surrealkv::Transaction) -> Self {
        Self { inner, _store: std::marker::PhantomData }
    }

    /// Read the current value for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] on an underlying engine failure.
    pub fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner
            .get(key)
            .map_err(|e| StorageError::Engine(e.to_string()))
    }

    /// Write `value` at `key`, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] on an underlying engine failure.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.inner
            .set(key, value)
            .map_err(|e| StorageError::Engine(e.to_string()))
    }

    /// Remove `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] on an underlying engine failure.
    pub fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        self.inner
            .delete(key)
            .map_err(|e| StorageError::Engine(e.to_string()))
    }

    /// List all `(key, value)` pairs whose key starts with `prefix`, in
    /// key order. Used for `readdir` and `attr-list`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Engine`] on an underlying engine failure.
    pub fn scan_prefix(&mut self, prefix: &[u8]) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let upper_bound = prefix_upper_bound(prefix);
        let range = prefix.to_vec()..upper_bound;
        self.inner
            .scan(range, None)
            .map_err(|e| StorageError::Engine(e.to_string()))
            .map(|rows| {
                rows.into_iter()
                    .map(|(k, v, _ts)| (k.to_vec(), v))
                    .collect()
            })
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if a concurrent transaction
    /// wrote to overlapping keys first; the caller should retry the
    /// whole transaction (see [`crate::retry::with_retry`]).
    pub fn commit(self) -> StorageResult<()> {
        self.inner.commit().map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("conflict") {
                StorageError::Conflict
            } else {
                StorageError::Engine(message)
            }
        })
    }
}

/// Read-modify-write a big-endian `u64` counter at `key` within `txn`,
/// returning its new value. Used when an id must be allocated atomically
/// with the rest of a transaction's writes (`spec.md` §4.4 step 1), as
/// opposed to [`crate::store::Store::next_counter`], which commits on its
/// own.
///
/// # Errors
///
/// Returns [`StorageError::Engine`] on an underlying engine failure, or
/// [`StorageError::Serialization`] if an existing value at `key` is not
/// an 8-byte counter.
pub fn bump_counter_in_txn(txn: &mut Transaction<'_>, key: &[u8]) -> StorageResult<u64> {
    let current = match txn.get(key)? {
        Some(bytes) if bytes.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes);
            u64::from_be_bytes(buf)
        }
        Some(_) => {
            return Err(StorageError::Serialization(format!(
                "counter at key of unexpected length (key len {})",
                key.len()
            )))
        }
        None => 0,
    };
    let next = current + 1;
    txn.put(key, &next.to_be_bytes())?;
    Ok(next)
}

/// The exclusive upper bound of the key range sharing `prefix`: `prefix`
/// with its last byte incremented, carrying into a longer key if the
/// last byte is `0xFF`.
fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut upper = prefix.to_vec();
    for idx in (0..upper.len()).rev() {
        if upper[idx] != 0xFF {
            upper[idx] += 1;
            upper.truncate(idx + 1);
            return upper;
        }
    }
    // Every byte was 0xFF: there is no finite upper bound, so scan to the
    // largest possible key.
    vec![0xFF; prefix.len() + 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_bound_increments_the_last_byte() {
        assert_eq!(prefix_upper_bound(b"c:/test\0"), b"c:/test\x01".to_vec());
    }

    #[test]
    fn upper_bound_carries_through_trailing_0xff() {
        assert_eq!(prefix_upper_bound(&[1, 0xFF]), vec![2]);
    }
}

//! Extended attributes on a node: arbitrary name/value pairs, independent
//! of the node record itself so a large attribute value never forces a
//! rewrite of the handle/lock bookkeeping.

use hyperspace_core::NodePath;
use hyperspace_storage::{StorageResult, Transaction};

fn xattr_key(path: &NodePath, name: &str) -> Vec<u8> {
    let mut key = b"x:".to_vec();
    key.extend_from_slice(path.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(name.as_bytes());
    key
}

fn xattr_prefix(path: &NodePath) -> Vec<u8> {
    let mut key = b"x:".to_vec();
    key.extend_from_slice(path.as_str().as_bytes());
    key.push(0);
    key
}

/// Set `name` to `value` on `path`.
///
/// # Errors
///
/// Returns a [`hyperspace_storage::StorageError`] if the transaction fails.
pub fn attr_set(
    txn: &mut Transaction<'_>,
    path: &NodePath,
    name: &str,
    value: &[u8],
) -> StorageResult<()> {
    txn.put(&xattr_key(path, name), value)
}

/// Read `name` on `path`.
///
/// # Errors
///
/// Returns a [`hyperspace_storage::StorageError`] if the transaction fails.
pub fn attr_get(
    txn: &mut Transaction<'_>,
    path: &NodePath,
    name: &str,
) -> StorageResult<Option<Vec<u8>>> {
    txn.get(&xattr_key(path, name))
}

/// Test whether `name` exists on `path`.
///
/// # Errors
///
/// Returns a [`hyperspace_storage::StorageError`] if the transaction fails.
pub fn attr_exists(
    txn: &mut Transaction<'_>,
    path: &NodePath,
    name: &str,
) -> StorageResult<bool> {
    Ok(attr_get(txn, path, name)?.is_some())
}

/// Delete `name` on `path`. Idempotent.
///
/// # Errors
///
/// Returns a [`hyperspace_storage::StorageError`] if the transaction fails.
pub fn attr_del(txn: &mut Transaction<'_>, path: &NodePath, name: &str) -> StorageResult<()> {
    txn.delete(&xattr_key(path, name))
}

/// List every attribute name set on `path`.
///
/// # Errors
///
/// Returns a [`hyperspace_storage::StorageError`] if the transaction fails.
pub fn attr_list(txn: &mut Transaction<'_>, path: &NodePath) -> StorageResult<Vec<String>> {
    let prefix = xattr_prefix(path);
    let rows = txn.scan_prefix(&prefix)?;
    Ok(rows
        .into_iter()
        .filter_map(|(key, _)| {
            key.get(prefix.len()..)
                .map(|tail| String::from_utf8_lossy(tail).into_owned())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_storage::Store;

    #[test]
    fn set_get_del_roundtrip() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let path = NodePath::parse("/test").unwrap();
        let mut txn = store.begin().unwrap();

        attr_set(&mut txn, &path, "owner", b"alice").unwrap();
        assert_eq!(attr_get(&mut txn, &path, "owner").unwrap(), Some(b"alice".to_vec()));
        assert!(attr_exists(&mut txn, &path, "owner").unwrap());

        attr_del(&mut txn, &path, "owner").unwrap();
        assert!(!attr_exists(&mut txn, &path, "owner").unwrap());
    }

    #[test]
    fn list_finds_every_attribute_on_the_node_only() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let a = NodePath::parse("/a").unwrap();
        let ab = NodePath::parse("/a/b").unwrap();
        let mut txn = store.begin().unwrap();

        attr_set(&mut txn, &a, "one", b"1").unwrap();
        attr_set(&mut txn, &a, "two", b"2").unwrap();
        attr_set(&mut txn, &ab, "three", b"3").unwrap();

        let mut names = attr_list(&mut txn, &a).unwrap();
        names.sort();
        assert_eq!(names, vec!["one".to_owned(), "two".to_owned()]);
    }
}

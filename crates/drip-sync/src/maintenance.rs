//! Destructive maintenance. Callers are expected to confirm with the user
//! before invoking anything here.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use drip_storage::{remove_mirror_files, RemoteStore};

/// Delete every document in a remote collection. Refuses a blank collection
/// name rather than guessing what was meant.
pub async fn clear_remote_collection(
    remote: &dyn RemoteStore,
    collection: &str,
) -> Result<u64> {
    if collection.trim().is_empty() {
        bail!("refusing to clear an unnamed collection");
    }
    let deleted = remote
        .delete_collection(collection)
        .await
        .with_context(|| format!("clearing collection {collection}"))?;
    info!(collection, deleted, "remote collection cleared");
    Ok(deleted)
}

/// Delete the local mirror database and its WAL/SHM sidecars. Returns the
/// number of files removed.
pub fn clear_mirror(path: &Path) -> usize {
    let removed = remove_mirror_files(path);
    info!(path = %path.display(), removed, "mirror files removed");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_mirror_removes_database_and_sidecars() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("coffees.db");
        std::fs::write(&db, b"db").expect("db file");
        std::fs::write(dir.path().join("coffees.db-wal"), b"wal").expect("wal file");

        assert_eq!(clear_mirror(&db), 2);
        assert!(!db.exists());
        // Already gone: nothing left to remove.
        assert_eq!(clear_mirror(&db), 0);
    }
}

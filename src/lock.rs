//! Exclusive database lock.
//!
//! One operation at a time across the whole database: an advisory exclusive
//! lock on `db_root/state/lock`, acquired non-blocking at the start of every
//! operation and released on all exit paths when the guard drops (the OS
//! releases it if the process dies).

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// RAII guard for the database lock; releases on drop.
#[derive(Debug)]
pub struct DbLock {
    _file: File,
}

/// Acquire the exclusive operation lock, failing fast with
/// [`Error::DatabaseLocked`] when another operation holds it.
pub fn acquire(lock_path: &Path) -> Result<DbLock> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Do not delete the lock file on contention; another process may
    // legitimately hold the lock. Stale lock files are harmless because
    // advisory locks are released on process exit.
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;

    if file.try_lock_exclusive().is_err() {
        return Err(Error::DatabaseLocked);
    }

    Ok(DbLock { _file: file })
}

use std::fs::{File, OpenOptions};
use fs2::FileExt;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Single owner per index directory
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(storage.lock_path())?;

        file.try_lock_exclusive().map_err(|err| Error {
            kind: ErrorKind::InvalidState,
            context: format!(
                "index at {} is locked by another process: {}",
                storage.base_dir.display(),
                err
            ),
        })?;

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

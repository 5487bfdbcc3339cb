use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use crate::Result;
use crate::StoreError;

/// Open a file for appending, creating parent directories as needed.
pub fn open_file_for_append<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::IoError(e).into())
}

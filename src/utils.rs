//! File helpers shared by the key loader, predicate reader and registries.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::Path;

/// Upper bound for any single input file (keys, predicates, evidence).
pub const MAX_INPUT_FILE_SIZE: u64 = 64 * 1024 * 1024;

fn reject_symlink(path: &Path, allow_symlinks: bool) -> Result<()> {
    if allow_symlinks {
        return Ok(());
    }
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(Error::Validation(format!(
            "Refusing to follow symbolic link: {}",
            path.display()
        ))),
        _ => Ok(()),
    }
}

/// Open a file for reading, refusing symbolic links unless `allow_symlinks` is set.
pub fn safe_open_file(path: &Path, allow_symlinks: bool) -> Result<File> {
    reject_symlink(path, allow_symlinks)?;
    Ok(File::open(path)?)
}

/// Create (or truncate) a file for writing, refusing symbolic links unless `allow_symlinks` is set.
pub fn safe_create_file(path: &Path, allow_symlinks: bool) -> Result<File> {
    reject_symlink(path, allow_symlinks)?;
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

/// Read a whole file, enforcing [`MAX_INPUT_FILE_SIZE`].
pub fn read_file_bytes(path: &Path) -> Result<Vec<u8>> {
    let file = safe_open_file(path, false)?;
    let len = file.metadata()?.len();
    if len > MAX_INPUT_FILE_SIZE {
        return Err(Error::Validation(format!(
            "File {} exceeds the maximum supported size of {} bytes",
            path.display(),
            MAX_INPUT_FILE_SIZE
        )));
    }

    let mut data = Vec::with_capacity(len as usize);
    file.take(MAX_INPUT_FILE_SIZE).read_to_end(&mut data)?;
    Ok(data)
}

/// Resolve a value that may either name a file on disk or be the literal content itself.
///
/// Returns the bytes and whether they came from a file.
pub fn read_path_or_literal(value: &str) -> Result<(Vec<u8>, bool)> {
    let path = Path::new(value);
    if path.is_file() {
        Ok((read_file_bytes(path)?, true))
    } else {
        Ok((value.as_bytes().to_vec(), false))
    }
}

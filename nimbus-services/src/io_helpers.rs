// SPDX-License-Identifier: LGPL-3.0-only

//! Async I/O helpers using smol::unblock for non-blocking file operations

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Read a file, returning `Ok(None)` when it does not exist.
///
/// On success the file's modification time is bumped to now, which is what
/// the disk cache uses as its recency marker.
pub async fn read_and_touch(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let path = path.to_path_buf();
    smol::unblock(move || match fs::read(&path) {
        Ok(bytes) => {
            if let Err(e) = touch(&path) {
                log::trace!("Could not refresh mtime of {:?}: {}", path, e);
            }
            Ok(Some(bytes))
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    })
    .await
}

/// Write `bytes` to `path` through a temporary sibling and a rename, so a
/// concurrent reader never sees a half-written file.
///
/// Returns the size of the file that was replaced, if any.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> io::Result<Option<u64>> {
    let path = path.to_path_buf();
    smol::unblock(move || {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let previous = fs::metadata(&path).ok().map(|m| m.len());
        let tmp = temp_sibling(&path);
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(previous)
    })
    .await
}

/// Remove a directory tree (if present) and recreate it empty.
pub async fn reset_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    smol::unblock(move || {
        match fs::remove_dir_all(&path) {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&path)
    })
    .await
}

fn touch(path: &Path) -> io::Result<()> {
    fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

//! Crash-safe file replacement.
//!
//! 1. Write to a temporary file in the same directory
//! 2. `sync_all()` the temporary file
//! 3. Rename it over the final path
//! 4. Fsync the parent directory (Unix only)
//!
//! After a crash the target holds either the old or the new content.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no parent directory: {}", path.display()),
        )
    })?;
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("file");
    Ok(parent.join(format!(".{file_name}.tmp.{}", Uuid::new_v4())))
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Atomically replace `path` with `data`, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp = temp_path(path)?;
    let parent = temp.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result?;

    fsync_dir(parent)
}

/// Remove temp files left behind by interrupted writes.
pub fn remove_stale_temps(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)?.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') && name.contains(".tmp.") && fs::remove_file(entry.path()).is_ok()
        {
            removed += 1;
        }
    }
    Ok(removed)
}

//! Small shared helpers

use std::path::{Path, PathBuf};

use rand::prelude::IndexedRandom;

/// Creates the first `dir/{prefix}{N}{suffix}` that does not exist yet, N starting at 0.
///
/// The file is created with `create_new`, so concurrent writers into the
/// same directory never get the same path.
pub async fn reserve_next(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<PathBuf> {
    fs_err::tokio::create_dir_all(dir).await?;
    let mut index: u64 = 0;
    loop {
        let candidate = dir.join(format!("{}{}{}", prefix, index, suffix));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => {
                log::debug!("Reserved {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => index += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Writes `data` to a freshly reserved path in `dir`, creating the directory if needed.
pub async fn save_next(dir: &Path, prefix: &str, suffix: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    let path = reserve_next(dir, prefix, suffix).await?;
    fs_err::tokio::write(&path, data).await?;
    Ok(path)
}

/// Truncates to at most `max` characters (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Picks a uniformly random element.
pub fn pick<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::rng())
}

/// Removes files, ignoring the ones that are already gone.
pub async fn remove_files<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let path = path.as_ref();
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NAME_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `<pid>_<n>` where `n` never repeats within this process.
pub fn unique_suffix() -> String {
    format!(
        "{}_{}",
        std::process::id(),
        NAME_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// `<prefix>_<YYYYmmdd_HHMMSS>_<pid>_<n>` in local time. Distinct for every
/// call, so runs started in the same second never share a directory.
pub fn stamped_name(prefix: &str) -> String {
    format!(
        "{prefix}_{}_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        unique_suffix()
    )
}

/// Write a file atomically (temp file in the same directory + rename).
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let temp_name = format!(
        ".tmp_{}_{}",
        unique_suffix(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    );
    let temp_path = parent.join(&temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

/// Pretty-printed JSON through [`atomic_write`].
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    atomic_write(path, &bytes)
}

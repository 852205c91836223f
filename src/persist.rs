//! Atomic file persistence helpers.
//!
//! Every durable artifact (catalog, rotation state, checkpoint, content
//! files) is written with the same replace discipline: write to a temp file
//! in the same directory, fsync, then rename over the target. Readers never
//! observe a half-written file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomically replace `path` with pretty-printed JSON plus a trailing newline.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let mut body = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    body.push('\n');
    atomic_write(path, body.as_bytes())
}

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let body = std::fs::read_to_string(path)?;
    serde_json::from_str(&body).map_err(|e| std::io::Error::other(e.to_string()))
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Write-to-tempfile-then-rename primitives.
//!
//! Every mutating write in taskmesh goes through one of these so that a
//! reader never observes a half-written file: it either sees the old
//! content, or the new content, never a partial one.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Write `bytes` to `path` atomically: write to `<path>.tmp`, fsync, then
/// rename over `path`. Creates parent directories as needed.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{path:?} has no parent directory"))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory for {path:?}"))?;
    let tmp_path = tmp_path_for(path);
    {
        let mut f = File::create(&tmp_path)
            .with_context(|| format!("creating tempfile {tmp_path:?}"))?;
        f.write_all(bytes)
            .with_context(|| format!("writing tempfile {tmp_path:?}"))?;
        f.sync_all()
            .with_context(|| format!("fsyncing tempfile {tmp_path:?}"))?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {tmp_path:?} to {path:?}"))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically to `path`.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing JSON for {path:?}"))?;
    atomic_write_bytes(path, &bytes)
}

/// Copy `src` to `dst` atomically (read-then-atomic-write, so a reader
/// never sees a partially copied `dst`).
pub fn atomic_copy(src: &Path, dst: &Path) -> Result<()> {
    let bytes = fs::read(src).with_context(|| format!("reading {src:?}"))?;
    atomic_write_bytes(dst, &bytes)
}

/// Move `src` to `dst` via a single atomic rename, creating `dst`'s
/// parent directory first. Both paths must be on the same filesystem,
/// which always holds for paths rooted under the same agent/plan tree.
pub fn atomic_move(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory for {dst:?}"))?;
    }
    fs::rename(src, dst).with_context(|| format!("renaming {src:?} to {dst:?}"))?;
    Ok(())
}

/// Read and parse a JSON file. Callers that must tolerate a concurrently
/// written file (anything under an inbox/outbox, as opposed to a file
/// this process itself just wrote) should use [`read_json_tolerant`]
/// instead.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {path:?}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing JSON from {path:?}"))
}

/// Read and parse a JSON file, returning `Ok(None)` instead of erroring
/// when the file is missing, unparseable, or still has a `.tmp` suffix.
/// Readers must tolerate partial writes by skipping them.
pub fn read_json_tolerant<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
        return None;
    }
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Hex-encoded, `sha256:`-prefixed digest of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {path:?}"))?;
    Ok(taskmesh_core::sha256_hex_prefixed(&bytes))
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.json");
        atomic_write_json(&path, &serde_json::json!({"x": 1})).unwrap();
        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["x"], 1);
        assert!(!dir.path().join("a/b/c.json.tmp").exists());
    }

    #[test]
    fn tolerant_read_skips_tmp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json.tmp");
        fs::write(&path, b"{\"x\":1}").unwrap();
        let value: Option<serde_json::Value> = read_json_tolerant(&path);
        assert!(value.is_none());
    }

    #[test]
    fn tolerant_read_skips_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        fs::write(&path, b"not json").unwrap();
        let value: Option<serde_json::Value> = read_json_tolerant(&path);
        assert!(value.is_none());
    }

    #[test]
    fn atomic_move_relocates_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("nested/dst.txt");
        fs::write(&src, b"hello").unwrap();
        atomic_move(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn file_sha256_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();
        let h1 = file_sha256(&path).unwrap();
        let h2 = file_sha256(&path).unwrap();
        assert_eq!(h1, h2);
        assert!(h1.starts_with("sha256:"));
    }
}

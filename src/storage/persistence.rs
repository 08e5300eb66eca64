//! Partition file codec and replace-on-write persistence

use crate::core::{Result, StoreError};
use serde::{Serialize, de::DeserializeOwned};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

// ============================================================================
// Partition Codec
// ============================================================================

/// Data that can live in a registry partition.
///
/// The serde impls are the partition's codec. Types with interior state that
/// must be restored after decoding (such as entity identities) do it inside
/// their `Deserialize` impl, so a decoded value is always complete.
pub trait PartitionData: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> PartitionData for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Pretty-printed JSON, the on-disk format of every partition.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Codec(format!("Failed to encode partition: {}", e)))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Codec(format!("Failed to decode partition: {}", e)))
}

// ============================================================================
// File Access
// ============================================================================

/// Replace `path` with `bytes` in one step.
///
/// The content goes to a temp file in the same directory which is fsynced and
/// renamed over the target, so readers see either the old or the new file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| {
        StoreError::Io(format!(
            "Failed to create directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
        StoreError::Io(format!(
            "Failed to create temp file in '{}': {}",
            parent.display(),
            e
        ))
    })?;
    temp.write_all(bytes)
        .map_err(|e| StoreError::Io(format!("Failed to write '{}': {}", path.display(), e)))?;
    temp.flush()
        .map_err(|e| StoreError::Io(format!("Failed to flush '{}': {}", path.display(), e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StoreError::Io(format!("Failed to sync '{}': {}", path.display(), e)))?;
    temp.persist(path).map_err(|e| {
        StoreError::Io(format!(
            "Failed to replace '{}': {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

/// Read a partition file. Missing and blank files both yield `None`.
pub fn read_partition_file(path: &Path) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)
        .map_err(|e| StoreError::Io(format!("Failed to read '{}': {}", path.display(), e)))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(bytes))
}

/// Move an undecodable partition file out of the way so the next save does
/// not overwrite it.
pub fn quarantine(path: &Path) -> Result<PathBuf> {
    let mut name = OsString::from(path.as_os_str());
    name.push(".corrupt");
    let target = PathBuf::from(name);
    fs::rename(path, &target).map_err(|e| {
        StoreError::Io(format!(
            "Failed to move '{}' aside: {}",
            path.display(),
            e
        ))
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("counters.json");

        let mut counters = BTreeMap::new();
        counters.insert("hugs".to_string(), 3i64);
        write_atomic(&path, &encode(&counters).unwrap()).unwrap();

        let bytes = read_partition_file(&path).unwrap().unwrap();
        let loaded: BTreeMap<String, i64> = decode(&bytes).unwrap();
        assert_eq!(loaded, counters);
    }

    #[test]
    fn test_encoding_is_pretty_json() {
        let mut counters = BTreeMap::new();
        counters.insert("a".to_string(), 1i64);
        let text = String::from_utf8(encode(&counters).unwrap()).unwrap();
        assert_eq!(text, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_missing_and_blank_files_read_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.json");
        assert!(read_partition_file(&path).unwrap().is_none());

        fs::write(&path, b"  \n").unwrap();
        assert!(read_partition_file(&path).unwrap().is_none());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("debts.json");
        write_atomic(&path, b"[1]").unwrap();
        write_atomic(&path, b"[2]").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"[2]");
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("events.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_quarantine_moves_file_aside() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("expenses.json");
        fs::write(&path, b"{not json").unwrap();

        let moved = quarantine(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(moved, temp_dir.path().join("expenses.json.corrupt"));
        assert_eq!(fs::read(&moved).unwrap(), b"{not json");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<BTreeMap<String, i64>> = decode(b"{not json");
        assert!(matches!(result, Err(StoreError::Codec(_))));
    }
}

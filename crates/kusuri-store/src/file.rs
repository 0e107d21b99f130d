//! One JSON file per cache key under a directory.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{CacheStore, StoreError};

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Dir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Longest stem written as a plain escaped key.
const MAX_STEM_BYTES: usize = 200;
/// Escaped key bytes kept in front of the digest for longer keys.
const HASHED_HEAD_BYTES: usize = 120;
/// Separates the kept head from the digest. Never produced by escaping.
const DIGEST_SEP: char = '~';

/// Filesystem-safe name for a cache key. ASCII alphanumerics, `-`, `_` and
/// `.` pass through and every other byte becomes `%XX`. Keys whose escaped
/// form exceeds [`MAX_STEM_BYTES`] keep a truncated head followed by the
/// SHA-256 of the whole key, so the name stays under the 255-byte limit
/// while still starting with the escaped key.
fn file_stem(key: &str) -> String {
    let escaped = escape(key, usize::MAX);
    if escaped.len() <= MAX_STEM_BYTES {
        return escaped;
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut stem = escape(key, HASHED_HEAD_BYTES);
    stem.push(DIGEST_SEP);
    for b in digest.iter() {
        stem.push_str(&format!("{b:02x}"));
    }
    stem
}

/// Escape `key` byte by byte, stopping before the output would pass `limit`.
/// Escapes are never split.
fn escape(key: &str, limit: usize) -> String {
    let mut out = String::with_capacity(key.len().min(limit));
    for b in key.bytes() {
        let piece = if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
            (b as char).to_string()
        } else {
            format!("%{b:02X}")
        };
        if out.len() + piece.len() > limit {
            break;
        }
        out.push_str(&piece);
    }
    out
}

/// Whether the file stem `stem` belongs to a key starting with `prefix`.
/// For digest stems only the kept head is compared, so prefixes longer than
/// [`HASHED_HEAD_BYTES`] escaped bytes never match them.
fn stem_has_prefix(stem: &str, prefix: &str) -> bool {
    let head = stem.split(DIGEST_SEP).next().unwrap_or(stem);
    head.starts_with(&escape(prefix, usize::MAX))
}

fn remove_matching(dir: &Path, prefix: &str, keep: Option<&str>) -> Result<usize, StoreError> {
    let keep = keep.map(file_stem);
    let entries = std::fs::read_dir(dir).map_err(|source| StoreError::Dir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Dir {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
            continue;
        };
        if !stem_has_prefix(stem, prefix) || keep.as_deref() == Some(stem) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Write {
                    key: stem.to_string(),
                    source,
                });
            }
        }
    }
    Ok(removed)
}

fn write_atomic(dir: &Path, target: &Path, key: &str, value: &str) -> Result<(), StoreError> {
    let write_err = |source: std::io::Error| StoreError::Write {
        key: key.to_string(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(value.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[async_trait::async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let dir = self.dir.clone();
        let target = self.path_for(key);
        let owned_key = key.to_string();
        let bytes = value.len();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &owned_key, &value))
            .await
            .map_err(|e| StoreError::Other(format!("cache write task failed: {e}")))??;
        debug!(key, bytes, "cache file written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn remove_prefix(&self, prefix: &str, keep: Option<&str>) -> Result<usize, StoreError> {
        let dir = self.dir.clone();
        let prefix_owned = prefix.to_string();
        let keep = keep.map(str::to_string);
        let removed = tokio::task::spawn_blocking(move || {
            remove_matching(&dir, &prefix_owned, keep.as_deref())
        })
        .await
        .map_err(|e| StoreError::Other(format!("cache sweep task failed: {e}")))??;
        debug!(prefix, removed, "cache files removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.put("shortage", r#"{"timestamp":1,"data":[]}"#.into()).await.unwrap();

        let reopened = FileStore::open(tmp.path()).unwrap();
        assert_eq!(
            reopened.get("shortage").await.unwrap().as_deref(),
            Some(r#"{"timestamp":1,"data":[]}"#)
        );
    }

    #[tokio::test]
    async fn missing_key_is_none_and_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().join("nested/cache")).unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
        store.remove("nope").await.unwrap();

        store.put("k", "v".into()).await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.put("k", "first".into()).await.unwrap();
        store.put("k", "second".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("second"));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn keys_with_queries_map_to_distinct_files() {
        let a = file_stem("incidents?word=ロキソニン&count=20");
        let b = file_stem("incidents?word=ロキソニン&count=50");
        assert_ne!(a, b);
        assert!(a.starts_with("incidents%3Fword%3D%E3"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || "-_.%".contains(c)));
        assert_eq!(file_stem("shortage"), "shortage");
    }

    fn long_incident_key(filter: &str) -> String {
        format!(
            "incidents?word=ロキソプロフェンナトリウム水和物&filter={filter}&count=50&order=2"
        )
    }

    #[tokio::test]
    async fn long_keys_get_short_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        let a = long_incident_key("数量間違い");
        let b = long_incident_key("規格間違い");

        for key in [&a, &b] {
            let path = store.path_for(key);
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.len() <= 255, "{} bytes", name.len());
            assert!(name.starts_with("incidents%3Fword%3D%E3"));
        }
        assert_ne!(store.path_for(&a), store.path_for(&b));

        store.put(&a, "a".into()).await.unwrap();
        store.put(&b, "b".into()).await.unwrap();
        assert_eq!(store.get(&a).await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.get(&b).await.unwrap().as_deref(), Some("b"));

        store.remove(&a).await.unwrap();
        assert_eq!(store.get(&a).await.unwrap(), None);
        assert_eq!(store.get(&b).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn remove_prefix_covers_long_keys_and_spares_keep() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        let long = long_incident_key("数量間違い");
        for key in [long.as_str(), "incidents?count=20&order=2", "pollen-20260301", "pollen-20260302"] {
            store.put(key, "[]".into()).await.unwrap();
        }

        assert_eq!(store.remove_prefix("incidents?", None).await.unwrap(), 2);
        assert_eq!(store.get(&long).await.unwrap(), None);

        let removed = store
            .remove_prefix("pollen-", Some("pollen-20260302"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("pollen-20260302").await.unwrap().is_some());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}

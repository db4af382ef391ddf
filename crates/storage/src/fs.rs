use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::{ListPage, ObjectStore};

/// Object store backed by a local directory: one bucket per root, keys map
/// to relative paths with `/` as the separator. Object files carry an
/// `.obj` extension so that `env` and `env/keys` can both exist.
///
/// Writes go to a hidden temporary file in the target directory and are
/// renamed into place, so readers never observe partial bodies. Hidden
/// files (leading `.`) are not listed.
const OBJECT_EXTENSION: &str = ".obj";

/// Distinguishes staging files of concurrent writes to one key.
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsObjectStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidKey {
            key: key.to_string(),
        };
        if key.is_empty() || key.ends_with('/') {
            return Err(invalid());
        }
        let relative = Path::new(key);
        let components: Vec<Component> = relative.components().collect();
        for (i, component) in components.iter().enumerate() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_string_lossy();
                    let is_dir = i + 1 < components.len();
                    if part.starts_with('.') || (is_dir && part.ends_with(OBJECT_EXTENSION)) {
                        return Err(invalid());
                    }
                }
                _ => return Err(invalid()),
            }
        }
        Ok(self.root.join(format!("{key}{OBJECT_EXTENSION}")))
    }
}

fn unavailable(context: &str, err: io::Error) -> StorageError {
    StorageError::Unavailable(format!("{context}: {err}"))
}

fn join_error(err: tokio::task::JoinError) -> StorageError {
    StorageError::Unavailable(format!("filesystem task failed: {err}"))
}

/// Collect every non-hidden object file below `dir` as a `/`-separated key.
fn walk_keys(root: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_keys(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            if let Some(key) = key.strip_suffix(OBJECT_EXTENSION) {
                out.push(key.to_string());
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&key, e))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
            let staging =
                parent.join(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));
            std::fs::write(&staging, &body).map_err(|e| unavailable(&key, e))?;
            std::fs::rename(&staging, &path).map_err(|e| unavailable(&key, e))
        })
        .await
        .map_err(join_error)?
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        let key = key.to_string();
        tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&key, e)),
        })
        .await
        .map_err(join_error)?
    }

    async fn list_objects(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StorageError> {
        let max_keys = max_keys.max(1);
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let start_after = start_after.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            // Only descend into the directory the prefix names.
            let base = match prefix.rfind('/') {
                Some(idx) => root.join(&prefix[..idx]),
                None => root.clone(),
            };
            let mut keys = Vec::new();
            walk_keys(&root, &base, &mut keys).map_err(|e| unavailable(&prefix, e))?;
            keys.retain(|k| {
                k.starts_with(&prefix) && start_after.as_deref().map_or(true, |t| k.as_str() > t)
            });
            keys.sort();

            let next_token = if keys.len() > max_keys {
                keys.truncate(max_keys);
                keys.last().cloned()
            } else {
                None
            };
            Ok(ListPage { keys, next_token })
        })
        .await
        .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store
            .put_object("checks/ecs_status/2024-01-01T00:00:00.000000.json", b"{}".to_vec())
            .await
            .unwrap();
        let body = store
            .get_object("checks/ecs_status/2024-01-01T00:00:00.000000.json")
            .await
            .unwrap();
        assert_eq!(body, Some(b"{}".to_vec()));
        assert_eq!(store.get_object("checks/missing.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        for key in ["../outside", "/etc/passwd", "a/../../b", "a/.hidden", "", "dir/"] {
            let err = store.put_object(key, Vec::new()).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey { .. }), "{key}");
        }
    }

    #[tokio::test]
    async fn listing_skips_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put_object("a/1", Vec::new()).await.unwrap();
        std::fs::write(dir.path().join("a").join(".1.obj.99.tmp"), b"partial").unwrap();

        let page = store.list_objects("a/", None, 10).await.unwrap();
        assert_eq!(page.keys, vec!["a/1"]);
    }

    #[tokio::test]
    async fn a_key_and_its_children_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put_object("mastertest", b"{}".to_vec()).await.unwrap();
        store
            .put_object("mastertest/access_key_admin", b"keys".to_vec())
            .await
            .unwrap();

        assert_eq!(store.get_object("mastertest").await.unwrap(), Some(b"{}".to_vec()));
        let page = store.list_objects("", None, 10).await.unwrap();
        assert_eq!(page.keys, vec!["mastertest", "mastertest/access_key_admin"]);
        assert!(matches!(
            store.put_object("mastertest.obj/x", Vec::new()).await,
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_key_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsObjectStore::new(dir.path()));
        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .put_object("c/2024-01-01T00:00:00.000000.json", format!("{i}").into_bytes())
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let body = store
            .get_object("c/2024-01-01T00:00:00.000000.json")
            .await
            .unwrap()
            .unwrap();
        let written: usize = String::from_utf8(body).unwrap().parse().unwrap();
        assert!(written < 16);
        let page = store.list_objects("c/", None, 10).await.unwrap();
        assert_eq!(page.keys, vec!["c/2024-01-01T00:00:00.000000.json"]);
    }

    #[tokio::test]
    async fn listing_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let page = store.list_objects("nothing/here/", None, 10).await.unwrap();
        assert!(page.keys.is_empty());
        assert!(page.next_token.is_none());
    }
}

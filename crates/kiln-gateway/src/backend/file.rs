use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::backend::{validate_key, GatewayKind, STORAGE_VERSION};
use crate::error::{GatewayError, GatewayResult};
use crate::naming::StoreName;
use crate::traits::Gateway;
use crate::uri::{param, StoreUri};

/// Filesystem gateway: one file per entry.
///
/// Layout: `<path>/<name>/<role>/<key>`. Writes go to a hidden temporary
/// file in the same directory and are renamed into place, so a reader sees
/// either the old bytes or the new bytes, never a torn write.
pub struct FileGateway {
    tmp_seq: AtomicU64,
}

impl FileGateway {
    pub fn new() -> Self {
        Self {
            tmp_seq: AtomicU64::new(0),
        }
    }

    fn partition_dir(uri: &StoreUri) -> GatewayResult<PathBuf> {
        if uri.path().is_empty() {
            return Err(GatewayError::InvalidUri {
                uri: uri.to_string(),
                reason: "file store needs a directory path".into(),
            });
        }
        let name = StoreName::from_uri(uri)?;
        Ok(PathBuf::from(uri.path())
            .join(&name.name)
            .join(name.role.as_str()))
    }

    fn entry_path(uri: &StoreUri) -> GatewayResult<PathBuf> {
        let key = uri.key()?;
        validate_key(key)?;
        Ok(Self::partition_dir(uri)?.join(key))
    }
}

impl Default for FileGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for FileGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::File
    }

    async fn start(&self, base: &StoreUri) -> GatewayResult<StoreUri> {
        let dir = Self::partition_dir(base)?;
        fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "file store started");
        Ok(base.with_default_param(param::VERSION, STORAGE_VERSION))
    }

    async fn close(&self, _base: &StoreUri) -> GatewayResult<()> {
        Ok(())
    }

    async fn destroy(&self, base: &StoreUri) -> GatewayResult<()> {
        let dir = Self::partition_dir(base)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "file store destroyed");
        Ok(())
    }

    async fn put(&self, uri: &StoreUri, bytes: &[u8]) -> GatewayResult<()> {
        let path = Self::entry_path(uri)?;
        let dir = Self::partition_dir(uri)?;
        fs::create_dir_all(&dir).await?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let key = uri.key()?;
        let tmp = dir.join(format!(".{key}.{}.{seq}.tmp", std::process::id()));
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), len = bytes.len(), "wrote file entry");
        Ok(())
    }

    async fn get(&self, uri: &StoreUri) -> GatewayResult<Vec<u8>> {
        let path = Self::entry_path(uri)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(GatewayError::NotFound {
                key: uri.key()?.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, uri: &StoreUri) -> GatewayResult<()> {
        let path = Self::entry_path(uri)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, base: &StoreUri) -> GatewayResult<Vec<String>> {
        let dir = Self::partition_dir(base)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Temporary files from in-flight writes are hidden.
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for FileGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileGateway").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(dir: &tempfile::TempDir, role: &str) -> StoreUri {
        StoreUri::new("file", dir.path().to_string_lossy())
            .with_param("name", "db")
            .with_param("store", role)
    }

    #[tokio::test]
    async fn start_creates_partition_dir() {
        let dir = tempfile::tempdir().unwrap();
        let gw = FileGateway::new();
        gw.start(&base(&dir, "data")).await.unwrap();
        assert!(dir.path().join("db").join("data").is_dir());
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let gw = FileGateway::new();
        let base = gw.start(&base(&dir, "data")).await.unwrap();
        let uri = gw.build_url(&base, "bcafe").unwrap();

        gw.put(&uri, b"bytes").await.unwrap();
        assert_eq!(gw.get(&uri).await.unwrap(), b"bytes");
        assert_eq!(gw.keys(&base).await.unwrap(), vec!["bcafe"]);

        gw.delete(&uri).await.unwrap();
        assert!(gw.get(&uri).await.unwrap_err().is_not_found());
        gw.delete(&uri).await.unwrap();
    }

    #[tokio::test]
    async fn survives_a_new_gateway_instance() {
        let dir = tempfile::tempdir().unwrap();
        let uri = FileGateway::new()
            .build_url(&base(&dir, "meta"), "main")
            .unwrap();
        FileGateway::new().put(&uri, b"head").await.unwrap();
        assert_eq!(FileGateway::new().get(&uri).await.unwrap(), b"head");
    }

    #[tokio::test]
    async fn destroy_clears_only_its_partition() {
        let dir = tempfile::tempdir().unwrap();
        let gw = FileGateway::new();
        let data = gw.build_url(&base(&dir, "data"), "a").unwrap();
        let meta = gw.build_url(&base(&dir, "meta"), "main").unwrap();
        gw.put(&data, b"1").await.unwrap();
        gw.put(&meta, b"2").await.unwrap();

        gw.destroy(&base(&dir, "data")).await.unwrap();
        assert!(gw.keys(&base(&dir, "data")).await.unwrap().is_empty());
        assert_eq!(gw.get(&meta).await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn keys_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gw = FileGateway::new();
        assert!(gw.keys(&base(&dir, "wal")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let gw = FileGateway::new();
        let uri = base(&dir, "data").with_param("key", "..");
        assert!(gw.put(&uri, b"x").await.unwrap_err().is_config());
    }
}

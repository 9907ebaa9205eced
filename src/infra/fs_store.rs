use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::app::ports::ObjectStorePort;
use crate::error::{EtlError, Result};

/// Local-directory stand-in for object storage: `root/bucket/key`, with the
/// metadata written next to the object as `key.meta.json`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(EtlError::Upload {
                message: format!("invalid object key '{}'", key),
            });
        }
        Ok(self.root.join(bucket).join(rel))
    }
}

#[async_trait]
impl ObjectStorePort for FsObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        let mut meta_name = path.as_os_str().to_owned();
        meta_name.push(".meta.json");
        tokio::fs::write(PathBuf::from(meta_name), serde_json::to_vec_pretty(&metadata)?).await?;

        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_object_writes_bytes_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.ensure_bucket("covid").await.unwrap();
        // a second call on an existing bucket is fine
        store.ensure_bucket("covid").await.unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("sha256".to_string(), "abc".to_string());
        let uri = store
            .put_object("covid", "2024/transformed_data.csv", b"a,b\n1,2\n".to_vec(), metadata)
            .await
            .unwrap();

        let path = dir.path().join("covid/2024/transformed_data.csv");
        assert!(uri.ends_with("covid/2024/transformed_data.csv"));
        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n1,2\n");

        let meta: HashMap<String, String> = serde_json::from_slice(
            &std::fs::read(dir.path().join("covid/2024/transformed_data.csv.meta.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta.get("sha256").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        for key in ["../outside.csv", "/abs.csv", ""] {
            let err = store
                .put_object("covid", key, Vec::new(), HashMap::new())
                .await
                .unwrap_err();
            assert!(matches!(err, EtlError::Upload { .. }), "key {:?}", key);
        }
    }
}

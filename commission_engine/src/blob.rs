//! Blob storage for spiff proof images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: &[u8]) -> AppResult<()>;
    async fn read(&self, path: &str) -> AppResult<Vec<u8>>;
    /// Removing a blob that does not exist is not an error.
    async fn delete(&self, path: &str) -> AppResult<()>;
    fn public_url(&self, path: &str) -> String;
}

/// Stores blobs as plain files under `root`.
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> AppResult<PathBuf> {
        validate_blob_path(path)?;
        Ok(path.split('/').fold(self.root.clone(), |acc, seg| acc.join(seg)))
    }
}

/// Accepts relative `/`-separated paths without empty, `.` or `..` segments.
pub fn validate_blob_path(path: &str) -> AppResult<()> {
    let bad = path.is_empty()
        || path
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
    if bad {
        return Err(AppError::InvalidInput(format!("invalid blob path `{path}`")));
    }
    Ok(())
}

/// Maps an upload content type to the file extension used for storage.
pub fn image_extension(content_type: &str) -> AppResult<&'static str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/webp" => Ok("webp"),
        "image/gif" => Ok("gif"),
        other => Err(AppError::InvalidInput(format!(
            "unsupported proof content type `{other}`"
        ))),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: &[u8]) -> AppResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent().filter(|p| *p != Path::new("")) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path, size = bytes.len(), "stored blob");
        Ok(())
    }

    async fn read(&self, path: &str) -> AppResult<Vec<u8>> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::read(&target).await?)
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                tracing::debug!(path, "removed blob");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path(), "https://cdn.example.com/proofs/");

        store
            .upload("owner/spiff.png", b"\x89PNG")
            .await
            .expect("upload");
        let bytes = store.read("owner/spiff.png").await.expect("read");
        assert_eq!(bytes, b"\x89PNG");
        assert_eq!(
            store.public_url("owner/spiff.png"),
            "https://cdn.example.com/proofs/owner/spiff.png"
        );
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path(), "http://localhost/proofs");
        assert!(matches!(
            store.read("nobody/none.png").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_removes_blob_and_tolerates_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path(), "http://localhost/proofs");
        store.upload("owner/old.jpg", b"jpeg").await.expect("upload");

        store.delete("owner/old.jpg").await.expect("delete");
        assert!(matches!(
            store.read("owner/old.jpg").await,
            Err(AppError::NotFound)
        ));
        store.delete("owner/old.jpg").await.expect("second delete");
        assert!(store.delete("../escape.png").await.is_err());
    }

    #[test]
    fn rejects_traversal_paths() {
        for path in ["", "../etc/passwd", "/abs.png", "a//b.png", "a/./b.png", "a\\b.png"] {
            assert!(validate_blob_path(path).is_err(), "{path:?} should be rejected");
        }
        assert!(validate_blob_path("owner/spiff.jpg").is_ok());
    }

    #[test]
    fn maps_image_content_types() {
        assert_eq!(image_extension("image/png").expect("png"), "png");
        assert_eq!(image_extension("IMAGE/JPEG; charset=binary").expect("jpg"), "jpg");
        assert!(image_extension("application/pdf").is_err());
    }
}

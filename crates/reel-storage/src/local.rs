//! Local serving directory.
//!
//! Finished videos are moved here and read back by the streaming endpoint.
//! Only usable by a single instance: other replicas cannot see the files.

use std::path::{Path, PathBuf};

use reel_models::JobId;
use tokio::fs::{self, File};

use crate::error::{StorageError, StorageResult};

/// URL prefix the API serves local videos under.
pub const LOCAL_URL_PREFIX: &str = "/videos";

/// Directory of videos served by filename.
#[derive(Debug, Clone)]
pub struct LocalVideoStore {
    root: PathBuf,
}

impl LocalVideoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("LOCAL_VIDEO_DIR").unwrap_or_else(|_| "/tmp/reel/videos".to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filename_for(job_id: &JobId) -> String {
        format!("{}.mp4", job_id)
    }

    /// Path a job's video is stored at.
    pub fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.root.join(Self::filename_for(job_id))
    }

    /// Reference handed to clients for a job's video.
    pub fn url_for(job_id: &JobId) -> String {
        format!("{}/{}", LOCAL_URL_PREFIX, Self::filename_for(job_id))
    }

    /// Resolve a client-supplied filename inside the serving directory.
    ///
    /// Rejects anything that could escape it.
    pub fn resolve(&self, filename: &str) -> StorageResult<PathBuf> {
        let invalid = filename.is_empty()
            || filename.starts_with('.')
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains('\0');
        if invalid {
            return Err(StorageError::invalid_key(filename));
        }
        Ok(self.root.join(filename))
    }

    /// Open a served file, returning it with its size.
    pub async fn open(&self, filename: &str) -> StorageResult<(File, u64)> {
        let path = self.resolve(filename)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(filename));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::not_found(filename));
        }
        Ok((file, metadata.len()))
    }

    /// Move a finished file into the serving directory as `{jobId}.mp4`.
    pub async fn store(&self, src: &Path, job_id: &JobId) -> StorageResult<PathBuf> {
        let dst = self.path_for(job_id);
        move_file(src, &dst).await?;
        Ok(dst)
    }
}

/// Move a file, falling back to copy-and-delete across filesystems.
///
/// The work directory and serving directory are often on different mounts.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

/// EXDEV on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> StorageResult<()> {
    // Copy next to dst so the final rename stays on one filesystem
    let tmp_dst = dst.with_extension("tmp");
    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Failed to remove {} after cross-device move: {}", src.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = LocalVideoStore::new("/srv/videos");
        for name in ["../etc/passwd", "a/b.mp4", "..", ".hidden", "a\\b.mp4", ""] {
            assert!(matches!(store.resolve(name), Err(StorageError::InvalidKey(_))), "{name}");
        }
        assert_eq!(store.resolve("x.mp4").unwrap(), PathBuf::from("/srv/videos/x.mp4"));
    }

    #[test]
    fn test_url_for_job() {
        let id = JobId::from_string("abc");
        assert_eq!(LocalVideoStore::url_for(&id), "/videos/abc.mp4");
    }

    #[tokio::test]
    async fn test_store_and_open() {
        let work = TempDir::new().unwrap();
        let serve = TempDir::new().unwrap();
        let src = work.path().join("output.mp4");
        fs::write(&src, vec![7u8; 256]).await.unwrap();

        let store = LocalVideoStore::new(serve.path().join("videos"));
        let id = JobId::new();
        let dst = store.store(&src, &id).await.unwrap();

        assert!(!src.exists());
        assert!(dst.exists());
        let (_, size) = store.open(&LocalVideoStore::filename_for(&id)).await.unwrap();
        assert_eq!(size, 256);
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let serve = TempDir::new().unwrap();
        let store = LocalVideoStore::new(serve.path());
        assert!(matches!(store.open("missing.mp4").await, Err(StorageError::NotFound(_))));
    }
}

//! Background footage library.
//!
//! Footage lives under `{root}/backgrounds/{category}/` as video files.

use std::path::{Path, PathBuf};

use reel_models::BackgroundCategory;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "webm", "mkv"];

#[derive(Debug, Clone)]
pub struct BackgroundLibrary {
    root: PathBuf,
}

impl BackgroundLibrary {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn category_dir(&self, category: BackgroundCategory) -> PathBuf {
        self.root.join("backgrounds").join(category.as_str())
    }

    /// All clips for a category, sorted by path. `Random` spans every category.
    pub async fn clips(&self, category: BackgroundCategory) -> MediaResult<Vec<PathBuf>> {
        let categories: Vec<BackgroundCategory> = match category {
            BackgroundCategory::Random => BackgroundCategory::CONCRETE.to_vec(),
            other => vec![other],
        };

        let mut clips = Vec::new();
        for category in categories {
            let dir = self.category_dir(category);
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if is_video(&path) {
                    clips.push(path);
                }
            }
        }

        clips.sort();
        Ok(clips)
    }

    /// Pick one clip, stable for a given seed (the job id).
    pub async fn select(&self, category: BackgroundCategory, seed: &str) -> MediaResult<PathBuf> {
        let clips = self.clips(category).await?;
        if clips.is_empty() {
            return Err(MediaError::NoBackground(category.to_string()));
        }

        let index = (seed_value(seed) % clips.len() as u64) as usize;

        debug!("Selected background {} for {}", clips[index].display(), seed);
        Ok(clips[index].clone())
    }
}

/// First eight bytes of the seed's SHA-256; identical across builds and hosts.
fn seed_value(seed: &str) -> u64 {
    let digest = Sha256::digest(seed.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn library() -> (TempDir, BackgroundLibrary) {
        let dir = TempDir::new().unwrap();
        for (category, file) in [
            ("minecraft", "parkour_1.mp4"),
            ("minecraft", "parkour_2.MP4"),
            ("minecraft", "notes.txt"),
            ("subway", "run.webm"),
        ] {
            let path = dir.path().join("backgrounds").join(category);
            tokio::fs::create_dir_all(&path).await.unwrap();
            tokio::fs::write(path.join(file), b"x").await.unwrap();
        }
        let library = BackgroundLibrary::new(dir.path());
        (dir, library)
    }

    #[tokio::test]
    async fn test_clips_filters_non_video() {
        let (_dir, library) = library().await;
        let clips = library.clips(BackgroundCategory::Minecraft).await.unwrap();
        assert_eq!(clips.len(), 2);
    }

    #[tokio::test]
    async fn test_random_spans_categories() {
        let (_dir, library) = library().await;
        assert_eq!(library.clips(BackgroundCategory::Random).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_select_is_stable_and_errors_when_empty() {
        let (_dir, library) = library().await;
        let a = library.select(BackgroundCategory::Minecraft, "job-1").await.unwrap();
        let b = library.select(BackgroundCategory::Minecraft, "job-1").await.unwrap();
        assert_eq!(a, b);

        let err = library.select(BackgroundCategory::Cooking, "job-1").await.unwrap_err();
        assert!(matches!(err, MediaError::NoBackground(c) if c == "cooking"));
    }

    #[test]
    fn test_seed_value_is_pinned() {
        assert_eq!(seed_value("job-1"), 0x026a_b639_c21d_f8aa);
    }

    #[tokio::test]
    async fn test_select_picks_are_pinned() {
        let (_dir, library) = library().await;
        let first = library.select(BackgroundCategory::Minecraft, "job-1").await.unwrap();
        let second = library.select(BackgroundCategory::Minecraft, "job-2").await.unwrap();
        assert!(first.ends_with("parkour_1.mp4"));
        assert!(second.ends_with("parkour_2.MP4"));
    }
}

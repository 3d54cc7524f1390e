//! Where captured screenshots go.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::PathBuf;
use tracing::debug;

use crate::types::ImageData;

/// A stored capture: where it was written, if anywhere, and the payload to
/// show the model.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: Option<PathBuf>,
    pub image: ImageData,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store_png(&self, png: &[u8]) -> Result<StoredArtifact>;
}

/// `screenshot_<UTC timestamp>_<random>.png`, unique across concurrent sessions.
pub fn generate_name() -> String {
    format!(
        "screenshot_{}_{:08x}.png",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%3f"),
        rand::random::<u32>()
    )
}

fn inline_png(png: &[u8]) -> ImageData {
    ImageData {
        media_type: "image/png".to_string(),
        data: BASE64.encode(png),
    }
}

/// Writes every capture into a directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store_png(&self, png: &[u8]) -> Result<StoredArtifact> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let path = self.dir.join(generate_name());
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("Saved screenshot to {}", path.display());

        Ok(StoredArtifact {
            path: Some(path),
            image: inline_png(png),
        })
    }
}

/// Keeps captures in memory only.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineArtifactStore;

#[async_trait]
impl ArtifactStore for InlineArtifactStore {
    async fn store_png(&self, png: &[u8]) -> Result<StoredArtifact> {
        Ok(StoredArtifact {
            path: None,
            image: inline_png(png),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_distinct() {
        let a = generate_name();
        let b = generate_name();
        assert!(a.starts_with("screenshot_") && a.ends_with(".png"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn writes_into_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path().join("shots"));

        let stored = store.store_png(b"\x89PNG fake").await.unwrap();

        let path = stored.path.unwrap();
        assert!(path.starts_with(tmp.path().join("shots")));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG fake");
        assert_eq!(stored.image.media_type, "image/png");
        assert_eq!(BASE64.decode(stored.image.data).unwrap(), b"\x89PNG fake");
    }
}

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{CollabError, ThumbnailStore};

/// In-memory [`ThumbnailStore`]. Uploads for photos registered with
/// [`MemoryThumbnails::fail_photo`] fail, which lets tests exercise the
/// degraded-success path.
#[derive(Default)]
pub struct MemoryThumbnails {
    inner: Mutex<MemoryThumbnailsInner>,
}

#[derive(Default)]
struct MemoryThumbnailsInner {
    blobs: HashMap<String, Bytes>,
    failing: HashSet<String>,
}

impl MemoryThumbnails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_photo(&self, photo_id: impl Into<String>) {
        self.inner.lock().failing.insert(photo_id.into());
    }

    pub fn get(&self, reference: &str) -> Option<Bytes> {
        self.inner.lock().blobs.get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ThumbnailStore for MemoryThumbnails {
    async fn upload(
        &self,
        identity_id: &str,
        photo_id: &str,
        image: &[u8],
    ) -> Result<String, CollabError> {
        let mut inner = self.inner.lock();
        if inner.failing.contains(photo_id) {
            return Err(CollabError::Upload(format!("rejected thumbnail from {photo_id}")));
        }
        let reference = format!("mem://{identity_id}/{photo_id}");
        inner.blobs.insert(reference.clone(), Bytes::copy_from_slice(image));
        Ok(reference)
    }
}

/// Writes thumbnails as `<dir>/<identity_id>.jpg`. The reference is the
/// file name relative to `dir`.
pub struct DirThumbnails {
    dir: PathBuf,
}

impl DirThumbnails {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ThumbnailStore for DirThumbnails {
    async fn upload(
        &self,
        identity_id: &str,
        _photo_id: &str,
        image: &[u8],
    ) -> Result<String, CollabError> {
        if identity_id.contains(['/', '\\']) || identity_id.starts_with('.') {
            return Err(CollabError::Upload(format!(
                "identity id {identity_id:?} is not a valid file name"
            )));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{identity_id}.jpg");
        tokio::fs::write(self.dir.join(&name), image).await?;
        Ok(name)
    }
}

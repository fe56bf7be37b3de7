//! Interfaces to collaborators outside the engine: thumbnail storage and
//! the photo repository that holds photo → identity references.

mod photos;
mod thumbnail;

use async_trait::async_trait;
use thiserror::Error;

pub use self::photos::MemoryPhotoIndex;
pub(crate) use self::photos::{push_distinct, rewrite};
pub use self::thumbnail::{DirThumbnails, MemoryThumbnails};

/// Failure of an auxiliary write or lookup.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("collab: upload failed: {0}")]
    Upload(String),

    #[error("collab: repository error: {0}")]
    Repository(String),

    #[error("collab: io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores face thumbnails and hands back an opaque reference.
#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    async fn upload(
        &self,
        identity_id: &str,
        photo_id: &str,
        image: &[u8],
    ) -> Result<String, CollabError>;
}

/// Photo → identity references, owned outside the engine.
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Records that `photo_id` shows `identity_ids`. Additive.
    async fn attach(&self, photo_id: &str, identity_ids: &[String]) -> Result<(), CollabError>;

    /// Removes a photo. Returns the distinct identities it referenced.
    async fn detach(&self, photo_id: &str) -> Result<Vec<String>, CollabError>;

    /// Rewrites every reference to `source_id` into `target_id`.
    /// Returns the number of photos touched.
    async fn reassign(&self, source_id: &str, target_id: &str) -> Result<usize, CollabError>;

    /// Number of photos referencing `identity_id`.
    async fn count_references(&self, identity_id: &str) -> Result<u32, CollabError>;
}

//! Identity persistence.
//!
//! [`IdentityStore`] owns identity records and applies each mutation
//! atomically: either every field update of a call lands, or none do.
//! Each store also owns the async critical section that every resolver
//! over it holds while deciding and committing.

mod memory;
mod redb;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::ValidationError;
use crate::identity::{Identity, Sighting};
use crate::matcher::Snapshot;

pub use self::memory::MemoryStore;
pub use self::redb::{RedbPhotoIndex, RedbStore};

/// Default cap on retained samples per identity.
pub const DEFAULT_MAX_SAMPLES: usize = 5;

/// Errors returned by [`IdentityStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store: identity not found: {0}")]
    NotFound(String),

    #[error("store: identity already exists: {0}")]
    AlreadyExists(String),

    /// A sample whose dimension differs from the stored ones.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store: invalid merge: {0}")]
    InvalidMerge(String),

    #[error("store: backend error: {0}")]
    Backend(String),

    #[error("store: serialization error: {0}")]
    Serialization(String),
}

/// A garbage-collection candidate with its externally verified photo count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcCandidate {
    pub id: String,
    pub photo_count: u32,
}

impl GcCandidate {
    pub fn new(id: impl Into<String>, photo_count: u32) -> Self {
        Self {
            id: id.into(),
            photo_count,
        }
    }
}

/// Owns identity records.
///
/// Implementations must be safe for concurrent use.
/// Use [`MemoryStore`] for ephemeral storage and [`RedbStore`] to persist.
pub trait IdentityStore: Send + Sync {
    /// Gate held across a decide-and-commit sequence. One per store.
    fn critical_section(&self) -> &Mutex<()>;

    /// Retention cap applied on every mutation.
    fn max_samples(&self) -> usize;

    /// Point-in-time view for the matcher.
    fn snapshot(&self, id_prefix: &str) -> Result<Snapshot, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Identity>, StoreError>;

    /// All identities, in no particular order.
    fn list(&self) -> Result<Vec<Identity>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Appends the sighting to an existing identity. A sighting whose
    /// dimension differs from the identity's samples is rejected with
    /// [`StoreError::Validation`].
    fn apply_match(&self, id: &str, sighting: Sighting) -> Result<Identity, StoreError>;

    /// Inserts a new identity with a photo count of 1. Rejected with
    /// [`StoreError::Validation`] if other identities hold samples of a
    /// different dimension.
    fn create_identity(&self, id: &str, sighting: Sighting) -> Result<Identity, StoreError>;

    /// Folds `source_id` into `target_id` and deletes the source.
    /// Returns the updated target.
    fn merge(&self, source_id: &str, target_id: &str) -> Result<Identity, StoreError>;

    /// Deletes every candidate whose verified photo count is zero and syncs
    /// the stored count of the others. Unknown ids are skipped.
    /// Returns the deleted ids in candidate order.
    fn garbage_collect(&self, candidates: &[GcCandidate]) -> Result<Vec<String>, StoreError>;
}

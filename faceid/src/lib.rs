//! Face identity resolution: maps face descriptors to stable person ids.
//!
//! Each incoming descriptor is compared against the running average of every
//! known identity. The nearest identity within the distance threshold
//! absorbs the sample; otherwise a new identity is minted. Identities can be
//! merged by the user and are garbage-collected once no photo references
//! them.
//!
//! # Usage
//!
//! ```ignore
//! use photoid_faceid::{Config, Observation, Resolver};
//!
//! let resolver = Resolver::with_memory_store(Config::default())?;
//!
//! let outcome = resolver
//!     .resolve_batch(vec![
//!         Observation::new(face_a, "photo_1"),
//!         Observation::new(face_b, "photo_1"),
//!     ])
//!     .await?;
//! // ["person_1", "person_2"] for two different people
//! println!("{:?}", outcome.identity_ids());
//!
//! resolver.merge("person_2", "person_1").await?;
//! ```
//!
//! # Design
//!
//! Matching and commits run under one resolver-wide lock, one observation
//! at a time. Every decision sees the identities created by earlier
//! observations, including those from the same batch, so near-duplicate
//! faces in one upload collapse into a single identity and concurrent
//! uploads never mint duplicate ids.
//!
//! Ids are never reused: the store keeps a high-water mark of issued
//! suffixes that survives merges and garbage collection.

mod collab;
mod config;
mod descriptor;
mod error;
mod identity;
mod matcher;
mod resolver;
mod store;
mod types;

pub use collab::{
    CollabError, DirThumbnails, MemoryPhotoIndex, MemoryThumbnails, PhotoRepository,
    ThumbnailStore,
};
pub use config::Config;
pub use descriptor::{Descriptor, euclidean, mean};
pub use error::{FaceIdError, ValidationError};
pub use identity::{Identity, Sighting, format_id, parse_suffix};
pub use matcher::{Candidate, Decision, MatchParams, Snapshot, decide};
pub use resolver::{
    Assignment, BatchOutcome, ForgetResult, IdentityFilter, MergeResult, Resolver,
    SideEffectFailure, SideEffectKind,
};
pub use store::{
    DEFAULT_MAX_SAMPLES, GcCandidate, IdentityStore, MemoryStore, RedbPhotoIndex, RedbStore,
    StoreError,
};
pub use types::{BoundingBox, Observation, PhotoUpload};

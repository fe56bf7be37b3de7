use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use crate::collab::{PhotoRepository, ThumbnailStore};
use crate::config::Config;
use crate::descriptor::Descriptor;
use crate::error::{FaceIdError, ValidationError};
use crate::identity::{Identity, Sighting, parse_suffix};
use crate::matcher::{self, Decision, MatchParams};
use crate::store::{GcCandidate, IdentityStore, MemoryStore};
use crate::types::{BoundingBox, Observation, PhotoUpload};

/// Identity assigned to one observation of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Position of the observation in its batch.
    pub index: usize,
    pub identity_id: String,
    pub photo_id: String,
    pub bounding_box: BoundingBox,
    /// True when this observation created the identity.
    pub created: bool,
    /// Distance to the matched identity, or to the nearest one when a new
    /// identity was created. `None` on an empty store.
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    Thumbnail,
    PhotoReference,
}

/// An auxiliary write that failed without affecting identity assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectFailure {
    pub kind: SideEffectKind,
    pub photo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    pub message: String,
}

/// Result of [`Resolver::resolve_batch`].
///
/// Assignments are strict: one per observation, in input order. Side
/// effects (thumbnail uploads, photo references) are best-effort; compare
/// `side_effects_succeeded` with `side_effects_requested`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub assignments: Vec<Assignment>,
    pub side_effects_requested: usize,
    pub side_effects_succeeded: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SideEffectFailure>,
}

impl BatchOutcome {
    pub fn identity_ids(&self) -> Vec<&str> {
        self.assignments.iter().map(|a| a.identity_id.as_str()).collect()
    }

    pub fn created(&self) -> usize {
        self.assignments.iter().filter(|a| a.created).count()
    }

    /// True when some side effect failed.
    pub fn is_degraded(&self) -> bool {
        self.side_effects_succeeded < self.side_effects_requested
    }

    fn record_failure(&mut self, failure: SideEffectFailure) {
        warn!(
            kind = ?failure.kind,
            photo = %failure.photo_id,
            identity = ?failure.identity_id,
            error = %failure.message,
            "faceid: side effect failed"
        );
        self.failures.push(failure);
    }
}

/// Result of [`Resolver::merge`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    /// The surviving identity after absorbing the source.
    pub target: Identity,
    /// Id of the deleted source identity.
    pub removed: String,
    /// Photos whose references were rewritten to the target.
    pub photos_reassigned: usize,
    /// Set when the photo repository failed to rewrite references. The
    /// identity merge itself is committed regardless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reassign_error: Option<String>,
}

/// Result of [`Resolver::forget_photo`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForgetResult {
    /// Identities the photo referenced.
    pub affected: Vec<String>,
    /// Identities deleted because no photo references them anymore.
    pub deleted: Vec<String>,
}

/// Selects identities for [`Resolver::list_identities`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityFilter {
    /// Only identities referenced by at least this many photos.
    pub min_photos: u32,
    /// `Some(true)`: only with a thumbnail. `Some(false)`: only without.
    pub with_thumbnail: Option<bool>,
    pub limit: Option<usize>,
}

impl IdentityFilter {
    fn accepts(&self, ident: &Identity) -> bool {
        if ident.photo_count < self.min_photos {
            return false;
        }
        match self.with_thumbnail {
            Some(want) => ident.thumbnail_ref.is_some() == want,
            None => true,
        }
    }
}

/// A validated observation, ready to be decided.
struct Pending {
    descriptor: Descriptor,
    obs: Observation,
}

/// Resolves face observations to stable identities.
///
/// Every match decision and every store mutation runs under the store's
/// critical section, so each decision sees all earlier commits: a later
/// observation in a batch observes identities created by earlier ones, and
/// concurrent batches queue instead of interleaving, also across resolvers
/// sharing one store.
///
/// Thread-safe: all methods can be called concurrently.
pub struct Resolver {
    cfg: Config,
    params: MatchParams,
    store: Arc<dyn IdentityStore>,
    thumbnails: Option<Arc<dyn ThumbnailStore>>,
    photos: Option<Arc<dyn PhotoRepository>>,
}

impl Resolver {
    /// Creates a resolver over `store`. Fails if `cfg` is invalid.
    ///
    /// Retention is the store's: `cfg.max_samples` only applies to stores
    /// built from this config, such as [`Resolver::with_memory_store`]. A
    /// mismatch is logged.
    pub fn new(cfg: Config, store: Arc<dyn IdentityStore>) -> Result<Self, FaceIdError> {
        cfg.validate()?;
        if store.max_samples() != cfg.max_samples {
            warn!(
                config = cfg.max_samples,
                store = store.max_samples(),
                "faceid: store retention differs from config, store wins"
            );
        }
        Ok(Self {
            params: cfg.match_params(),
            cfg,
            store,
            thumbnails: None,
            photos: None,
        })
    }

    /// Creates a resolver with an in-memory store.
    pub fn with_memory_store(cfg: Config) -> Result<Self, FaceIdError> {
        let store = Arc::new(MemoryStore::new(cfg.max_samples));
        Self::new(cfg, store)
    }

    /// Uploads thumbnails for identities that don't have one yet.
    pub fn with_thumbnails(mut self, thumbnails: Arc<dyn ThumbnailStore>) -> Self {
        self.thumbnails = Some(thumbnails);
        self
    }

    /// Records photo references after each batch, rewrites them on merge
    /// and verifies counts during garbage collection.
    pub fn with_photos(mut self, photos: Arc<dyn PhotoRepository>) -> Self {
        self.photos = Some(photos);
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    async fn lock(&self) -> Result<MutexGuard<'_, ()>, FaceIdError> {
        let limit = self.cfg.lock_timeout();
        let gate = self.store.critical_section();
        match tokio::time::timeout(limit, gate.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                let waited_ms = limit.as_millis() as u64;
                warn!(waited_ms, "faceid: resolver lock timed out");
                Err(FaceIdError::LockTimeout { waited_ms })
            }
        }
    }

    /// Validates a photo upload and resolves its faces.
    pub async fn resolve_upload(&self, upload: PhotoUpload) -> Result<BatchOutcome, FaceIdError> {
        let observations = upload.into_observations()?;
        self.resolve_batch(observations).await
    }

    /// Resolves each observation to an identity, strictly in order.
    ///
    /// The whole batch is validated before anything is written; an invalid
    /// observation rejects the batch with no mutation. Each observation is
    /// then decided against the current store and committed before the next
    /// one is looked at. Commits are final: if the store fails midway, the
    /// earlier observations stay assigned, their photo references are still
    /// recorded, and the error is returned.
    pub async fn resolve_batch(
        &self,
        observations: Vec<Observation>,
    ) -> Result<BatchOutcome, FaceIdError> {
        let pending = self.validate(observations)?;
        let mut outcome = BatchOutcome::default();
        if pending.is_empty() {
            return Ok(outcome);
        }

        let _guard = self.lock().await?;
        for (index, p) in pending.into_iter().enumerate() {
            match self.resolve_one(index, p, &mut outcome).await {
                Ok(assignment) => outcome.assignments.push(assignment),
                Err(e) => {
                    warn!(
                        index,
                        committed = outcome.assignments.len(),
                        error = %e,
                        "faceid: batch aborted"
                    );
                    self.attach_photos(&mut outcome).await;
                    return Err(e);
                }
            }
        }
        self.attach_photos(&mut outcome).await;
        Ok(outcome)
    }

    fn validate(&self, observations: Vec<Observation>) -> Result<Vec<Pending>, ValidationError> {
        observations
            .into_iter()
            .enumerate()
            .map(|(index, mut obs)| {
                if obs.photo_id.is_empty() {
                    return Err(ValidationError::EmptyPhotoId { index });
                }
                let values = std::mem::take(&mut obs.descriptor);
                let descriptor = Descriptor::new(values, self.cfg.dim, index)?;
                Ok(Pending { descriptor, obs })
            })
            .collect()
    }

    /// Decide and commit one observation. Caller holds the lock.
    async fn resolve_one(
        &self,
        index: usize,
        p: Pending,
        outcome: &mut BatchOutcome,
    ) -> Result<Assignment, FaceIdError> {
        let snapshot = self.store.snapshot(&self.cfg.id_prefix)?;
        let decision = matcher::decide(&p.descriptor, &snapshot, &self.params);
        debug!(
            index,
            identity = %decision.id(),
            new = decision.is_new(),
            distance = ?decision.distance(),
            "faceid: decided"
        );

        let needs_thumbnail = match &decision {
            Decision::Matched { id, .. } => snapshot.get(id).is_some_and(|c| !c.has_thumbnail),
            Decision::New { .. } => true,
        };
        let mut sighting = Sighting::new(p.descriptor, p.obs.photo_id.clone());
        if needs_thumbnail {
            sighting.thumbnail_ref = self
                .upload_thumbnail(decision.id(), &p.obs, outcome)
                .await;
        }

        let ident = match &decision {
            Decision::Matched { id, .. } => self.store.apply_match(id, sighting)?,
            Decision::New { id, .. } => {
                let ident = self.store.create_identity(id, sighting)?;
                info!(identity = %ident.id, photo = %p.obs.photo_id, "faceid: new identity");
                ident
            }
        };

        Ok(Assignment {
            index,
            identity_id: ident.id,
            photo_id: p.obs.photo_id,
            bounding_box: p.obs.bounding_box,
            created: decision.is_new(),
            distance: decision.distance(),
        })
    }

    async fn upload_thumbnail(
        &self,
        identity_id: &str,
        obs: &Observation,
        outcome: &mut BatchOutcome,
    ) -> Option<String> {
        let (Some(thumbs), Some(image)) = (&self.thumbnails, &obs.thumbnail) else {
            return None;
        };
        outcome.side_effects_requested += 1;
        match thumbs.upload(identity_id, &obs.photo_id, image).await {
            Ok(reference) => {
                outcome.side_effects_succeeded += 1;
                Some(reference)
            }
            Err(e) => {
                outcome.record_failure(SideEffectFailure {
                    kind: SideEffectKind::Thumbnail,
                    photo_id: obs.photo_id.clone(),
                    identity_id: Some(identity_id.to_string()),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    /// Records photo → identity references, one call per distinct photo.
    async fn attach_photos(&self, outcome: &mut BatchOutcome) {
        let Some(photos) = &self.photos else {
            return;
        };
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for a in &outcome.assignments {
            match groups.iter_mut().find(|(photo, _)| *photo == a.photo_id) {
                Some((_, ids)) => ids.push(a.identity_id.clone()),
                None => groups.push((a.photo_id.clone(), vec![a.identity_id.clone()])),
            }
        }
        for (photo_id, ids) in groups {
            outcome.side_effects_requested += 1;
            match photos.attach(&photo_id, &ids).await {
                Ok(()) => outcome.side_effects_succeeded += 1,
                Err(e) => outcome.record_failure(SideEffectFailure {
                    kind: SideEffectKind::PhotoReference,
                    photo_id,
                    identity_id: None,
                    message: e.to_string(),
                }),
            }
        }
    }

    /// Folds `source_id` into `target_id` and deletes the source.
    ///
    /// The identity state transition is committed before the photo
    /// repository is asked to rewrite references; a repository failure is
    /// reported in [`MergeResult::reassign_error`].
    pub async fn merge(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<MergeResult, FaceIdError> {
        if source_id == target_id {
            return Err(ValidationError::SelfMerge {
                id: source_id.to_string(),
            }
            .into());
        }

        let _guard = self.lock().await?;
        for id in [source_id, target_id] {
            if self.store.get(id)?.is_none() {
                return Err(FaceIdError::NotFound { id: id.to_string() });
            }
        }
        let target = self.store.merge(source_id, target_id)?;
        info!(
            source = %source_id,
            target = %target_id,
            photo_count = target.photo_count,
            "faceid: merged identities"
        );

        let mut result = MergeResult {
            target,
            removed: source_id.to_string(),
            photos_reassigned: 0,
            reassign_error: None,
        };
        if let Some(photos) = &self.photos {
            match photos.reassign(source_id, target_id).await {
                Ok(n) => result.photos_reassigned = n,
                Err(e) => {
                    warn!(
                        source = %source_id,
                        target = %target_id,
                        error = %e,
                        "faceid: photo reassign failed"
                    );
                    result.reassign_error = Some(e.to_string());
                }
            }
        }
        Ok(result)
    }

    /// Deletes candidates no photo references anymore.
    ///
    /// Counts come from the photo repository when one is configured,
    /// otherwise from the stored `photo_count`. A candidate whose count
    /// cannot be verified is kept.
    pub async fn garbage_collect(
        &self,
        candidate_ids: &[String],
    ) -> Result<Vec<String>, FaceIdError> {
        let _guard = self.lock().await?;
        self.collect_locked(candidate_ids).await
    }

    /// Like [`Resolver::garbage_collect`], with counts the caller already
    /// verified.
    pub async fn garbage_collect_counted(
        &self,
        candidates: &[GcCandidate],
    ) -> Result<Vec<String>, FaceIdError> {
        let _guard = self.lock().await?;
        let deleted = self.store.garbage_collect(candidates)?;
        log_deleted(&deleted);
        Ok(deleted)
    }

    /// Removes a photo from the photo repository and collects the
    /// identities it referenced.
    pub async fn forget_photo(&self, photo_id: &str) -> Result<ForgetResult, FaceIdError> {
        let Some(photos) = &self.photos else {
            return Err(FaceIdError::Persistence(
                "no photo repository configured".into(),
            ));
        };
        let _guard = self.lock().await?;
        let affected = photos
            .detach(photo_id)
            .await
            .map_err(|e| FaceIdError::Persistence(e.to_string()))?;
        let deleted = self.collect_locked(&affected).await?;
        Ok(ForgetResult { affected, deleted })
    }

    async fn collect_locked(&self, candidate_ids: &[String]) -> Result<Vec<String>, FaceIdError> {
        let mut candidates = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let count = match &self.photos {
                Some(photos) => match photos.count_references(id).await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(
                            identity = %id,
                            error = %e,
                            "faceid: cannot verify photo count, keeping"
                        );
                        continue;
                    }
                },
                None => match self.store.get(id)? {
                    Some(ident) => ident.photo_count,
                    None => continue,
                },
            };
            candidates.push(GcCandidate::new(id.clone(), count));
        }
        let deleted = self.store.garbage_collect(&candidates)?;
        log_deleted(&deleted);
        Ok(deleted)
    }

    pub fn get_identity(&self, id: &str) -> Result<Identity, FaceIdError> {
        self.store
            .get(id)?
            .ok_or_else(|| FaceIdError::NotFound { id: id.to_string() })
    }

    /// Identities passing `filter`, most photographed first; ties by id
    /// number.
    pub fn list_identities(&self, filter: &IdentityFilter) -> Result<Vec<Identity>, FaceIdError> {
        let prefix = &self.cfg.id_prefix;
        let mut out: Vec<Identity> = self
            .store
            .list()?
            .into_iter()
            .filter(|i| filter.accepts(i))
            .collect();
        out.sort_by(|a, b| {
            b.photo_count
                .cmp(&a.photo_count)
                .then_with(|| {
                    let sa = parse_suffix(prefix, &a.id).unwrap_or(u64::MAX);
                    let sb = parse_suffix(prefix, &b.id).unwrap_or(u64::MAX);
                    sa.cmp(&sb)
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

fn log_deleted(deleted: &[String]) {
    if !deleted.is_empty() {
        info!(count = deleted.len(), ids = ?deleted, "faceid: collected orphan identities");
    }
}

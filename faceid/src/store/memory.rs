use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::{DEFAULT_MAX_SAMPLES, GcCandidate, IdentityStore, StoreError};
use crate::error::ValidationError;
use crate::identity::{Identity, Sighting, numeric_tail};
use crate::matcher::Snapshot;

/// In-memory [`IdentityStore`].
/// Data is lost on restart. Suitable for testing or ephemeral use.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    gate: Mutex<()>,
    max_samples: usize,
}

struct MemoryStoreInner {
    identities: HashMap<String, Identity>,
    high_water: Option<u64>,
}

impl MemoryStore {
    pub fn new(max_samples: usize) -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                identities: HashMap::new(),
                high_water: None,
            }),
            gate: Mutex::new(()),
            max_samples: max_samples.max(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SAMPLES)
    }
}

impl IdentityStore for MemoryStore {
    fn critical_section(&self) -> &Mutex<()> {
        &self.gate
    }

    fn max_samples(&self) -> usize {
        self.max_samples
    }

    fn snapshot(&self, id_prefix: &str) -> Result<Snapshot, StoreError> {
        let inner = self.inner.read();
        Ok(Snapshot::build(
            inner.identities.values(),
            id_prefix,
            inner.high_water,
        ))
    }

    fn get(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.inner.read().identities.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.inner.read().identities.values().cloned().collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().identities.len())
    }

    fn apply_match(&self, id: &str, sighting: Sighting) -> Result<Identity, StoreError> {
        let mut inner = self.inner.write();
        let ident = inner
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        ident.absorb(sighting, self.max_samples)?;
        Ok(ident.clone())
    }

    fn create_identity(&self, id: &str, sighting: Sighting) -> Result<Identity, StoreError> {
        let mut inner = self.inner.write();
        if inner.identities.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        if let Some(other) = inner.identities.values().next() {
            let got = sighting.descriptor.len();
            if got != other.dim() {
                return Err(ValidationError::SampleDimension {
                    id: other.id.clone(),
                    expected: other.dim(),
                    got,
                }
                .into());
            }
        }
        let ident = Identity::create(id, sighting);
        if let Some(n) = numeric_tail(id) {
            inner.high_water = inner.high_water.max(Some(n));
        }
        inner.identities.insert(id.to_string(), ident.clone());
        Ok(ident)
    }

    fn merge(&self, source_id: &str, target_id: &str) -> Result<Identity, StoreError> {
        if source_id == target_id {
            return Err(StoreError::InvalidMerge(format!(
                "source and target are both {source_id}"
            )));
        }
        let mut inner = self.inner.write();
        if !inner.identities.contains_key(target_id) {
            return Err(StoreError::NotFound(target_id.to_string()));
        }
        let source = inner
            .identities
            .get(source_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(source_id.to_string()))?;
        let target = inner
            .identities
            .get_mut(target_id)
            .ok_or_else(|| StoreError::NotFound(target_id.to_string()))?;
        target.absorb_identity(source, self.max_samples)?;
        let merged = target.clone();
        inner.identities.remove(source_id);
        Ok(merged)
    }

    fn garbage_collect(&self, candidates: &[GcCandidate]) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.write();
        let mut deleted = Vec::new();
        for c in candidates {
            if c.photo_count == 0 {
                if inner.identities.remove(&c.id).is_some() {
                    deleted.push(c.id.clone());
                }
            } else if let Some(ident) = inner.identities.get_mut(&c.id) {
                ident.photo_count = c.photo_count;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;

    fn sighting(v: f32) -> Sighting {
        Sighting::new(Descriptor::filled(v, 3), "photo-1")
    }

    #[test]
    fn create_and_get() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        let ident = store.get("person_1").unwrap().unwrap();
        assert_eq!(ident.photo_count, 1);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get("person_2").unwrap().is_none());
    }

    #[test]
    fn create_duplicate_fails() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        let err = store.create_identity("person_1", sighting(0.2)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.get("person_1").unwrap().unwrap().average, vec![0.1; 3]);
    }

    #[test]
    fn apply_match_missing_is_not_found() {
        let store = MemoryStore::default();
        let err = store.apply_match("person_9", sighting(0.1)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "person_9"));
    }

    #[test]
    fn apply_match_respects_cap() {
        let store = MemoryStore::new(2);
        store.create_identity("person_1", sighting(1.0)).unwrap();
        store.apply_match("person_1", sighting(2.0)).unwrap();
        let ident = store.apply_match("person_1", sighting(3.0)).unwrap();
        assert_eq!(ident.samples.len(), 2);
        assert_eq!(ident.average, vec![2.5; 3]);
        assert_eq!(ident.photo_count, 3);
    }

    #[test]
    fn apply_match_rejects_other_dimension() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(1.0)).unwrap();
        let narrow = Sighting::new(Descriptor::filled(3.0, 2), "photo-2");
        let err = store.apply_match("person_1", narrow).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::SampleDimension { expected: 3, got: 2, .. })
        ));
        let ident = store.get("person_1").unwrap().unwrap();
        assert_eq!(ident.average, vec![1.0; 3]);
        assert_eq!(ident.photo_count, 1);
    }

    #[test]
    fn create_rejects_other_dimension() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(1.0)).unwrap();
        let narrow = Sighting::new(Descriptor::filled(3.0, 2), "photo-2");
        assert!(matches!(
            store.create_identity("person_2", narrow),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.snapshot("person").unwrap().high_water, Some(1));
    }

    #[test]
    fn merge_rejects_other_dimension_and_keeps_source() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(1.0)).unwrap();
        // Bypass the create check by building the record directly.
        store.inner.write().identities.insert(
            "person_2".into(),
            Identity::create("person_2", Sighting::new(Descriptor::filled(1.0, 2), "p")),
        );
        assert!(matches!(
            store.merge("person_2", "person_1"),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get("person_1").unwrap().unwrap().photo_count, 1);
    }

    #[test]
    fn merge_removes_source() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        store.create_identity("person_2", sighting(0.2)).unwrap();
        let merged = store.merge("person_2", "person_1").unwrap();
        assert_eq!(merged.photo_count, 2);
        assert_eq!(merged.samples.len(), 2);
        assert!(store.get("person_2").unwrap().is_none());
    }

    #[test]
    fn merge_missing_leaves_store_unchanged() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        assert!(matches!(
            store.merge("person_1", "person_5"),
            Err(StoreError::NotFound(id)) if id == "person_5"
        ));
        assert!(matches!(
            store.merge("person_5", "person_1"),
            Err(StoreError::NotFound(id)) if id == "person_5"
        ));
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("person_1").unwrap().unwrap().photo_count, 1);
    }

    #[test]
    fn merge_into_self_is_rejected() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        assert!(matches!(
            store.merge("person_1", "person_1"),
            Err(StoreError::InvalidMerge(_))
        ));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn garbage_collect_deletes_zero_counts() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        store.create_identity("person_2", sighting(0.5)).unwrap();
        let deleted = store
            .garbage_collect(&[
                GcCandidate::new("person_1", 0),
                GcCandidate::new("person_2", 3),
                GcCandidate::new("person_9", 0),
            ])
            .unwrap();
        assert_eq!(deleted, vec!["person_1".to_string()]);
        assert_eq!(store.get("person_2").unwrap().unwrap().photo_count, 3);
    }

    #[test]
    fn snapshot_keeps_high_water_after_delete() {
        let store = MemoryStore::default();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        store.create_identity("person_2", sighting(0.5)).unwrap();
        store
            .garbage_collect(&[GcCandidate::new("person_2", 0)])
            .unwrap();
        let snap = store.snapshot("person").unwrap();
        assert_eq!(snap.candidates.len(), 1);
        assert_eq!(snap.high_water, Some(2));
        assert_eq!(snap.next_suffix(1), 3);
    }
}

//! Redb-backed persistent identity store and photo index.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use tokio::sync::Mutex;

use super::{DEFAULT_MAX_SAMPLES, GcCandidate, IdentityStore, StoreError};
use crate::collab::{CollabError, PhotoRepository, push_distinct, rewrite};
use crate::error::ValidationError;
use crate::identity::{Identity, Sighting, numeric_tail};
use crate::matcher::Snapshot;

const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const PHOTOS: TableDefinition<&str, &[u8]> = TableDefinition::new("photos");

const HIGH_WATER_KEY: &str = "high_water";

fn backend<E: fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode(ident: &Identity) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(ident).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(data: &[u8]) -> Result<Identity, StoreError> {
    serde_json::from_slice(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// A persistent [`IdentityStore`] backed by redb.
///
/// Identities are stored as JSON, one row per id. Every mutation runs in a
/// single write transaction, so a failed call leaves no partial update.
pub struct RedbStore {
    db: Arc<Database>,
    gate: Mutex<()>,
    max_samples: usize,
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P, max_samples: usize) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;

        // Create the tables if they don't exist
        let tx = db.begin_write().map_err(backend)?;
        {
            tx.open_table(IDENTITIES).map_err(backend)?;
            tx.open_table(META).map_err(backend)?;
            tx.open_table(PHOTOS).map_err(backend)?;
        }
        tx.commit().map_err(backend)?;

        Ok(Self {
            db: Arc::new(db),
            gate: Mutex::new(()),
            max_samples: max_samples.max(1),
        })
    }

    /// Open with [`DEFAULT_MAX_SAMPLES`].
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open(path, DEFAULT_MAX_SAMPLES)
    }

    /// A photo index sharing this store's database file.
    pub fn photo_index(&self) -> RedbPhotoIndex {
        RedbPhotoIndex {
            db: Arc::clone(&self.db),
        }
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.db.begin_write().map_err(backend)?;
        // Dropping `tx` without commit aborts it.
        let out = f(&tx)?;
        tx.commit().map_err(backend)?;
        Ok(out)
    }
}

fn load(tx: &WriteTransaction, id: &str) -> Result<Option<Identity>, StoreError> {
    let table = tx.open_table(IDENTITIES).map_err(backend)?;
    let data = table.get(id).map_err(backend)?.map(|v| v.value().to_vec());
    data.map(|d| decode(&d)).transpose()
}

fn save(tx: &WriteTransaction, ident: &Identity) -> Result<(), StoreError> {
    let data = encode(ident)?;
    let mut table = tx.open_table(IDENTITIES).map_err(backend)?;
    table.insert(ident.id.as_str(), data.as_slice()).map_err(backend)?;
    Ok(())
}

/// Dimension of any stored identity, `None` when the table is empty.
fn stored_dim(tx: &WriteTransaction) -> Result<Option<(String, usize)>, StoreError> {
    let table = tx.open_table(IDENTITIES).map_err(backend)?;
    let first = match table.iter().map_err(backend)?.next() {
        Some(item) => {
            let (_, value) = item.map_err(backend)?;
            Some(decode(value.value())?)
        }
        None => None,
    };
    Ok(first.map(|ident| {
        let dim = ident.dim();
        (ident.id, dim)
    }))
}

fn remove(tx: &WriteTransaction, id: &str) -> Result<bool, StoreError> {
    let mut table = tx.open_table(IDENTITIES).map_err(backend)?;
    let existed = table.remove(id).map_err(backend)?.is_some();
    Ok(existed)
}

impl IdentityStore for RedbStore {
    fn critical_section(&self) -> &Mutex<()> {
        &self.gate
    }

    fn max_samples(&self) -> usize {
        self.max_samples
    }

    fn snapshot(&self, id_prefix: &str) -> Result<Snapshot, StoreError> {
        let identities = self.list()?;
        let tx = self.db.begin_read().map_err(backend)?;
        let meta = tx.open_table(META).map_err(backend)?;
        let high_water = meta
            .get(HIGH_WATER_KEY)
            .map_err(backend)?
            .map(|v| v.value());
        Ok(Snapshot::build(identities.iter(), id_prefix, high_water))
    }

    fn get(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(IDENTITIES).map_err(backend)?;
        match table.get(id).map_err(backend)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(IDENTITIES).map_err(backend)?;
        let mut out = Vec::new();
        for item in table.iter().map_err(backend)? {
            let (_, value) = item.map_err(backend)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(IDENTITIES).map_err(backend)?;
        let mut n = 0;
        for item in table.iter().map_err(backend)? {
            item.map_err(backend)?;
            n += 1;
        }
        Ok(n)
    }

    fn apply_match(&self, id: &str, sighting: Sighting) -> Result<Identity, StoreError> {
        self.write(|tx| {
            let mut ident = load(tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            ident.absorb(sighting, self.max_samples)?;
            save(tx, &ident)?;
            Ok(ident)
        })
    }

    fn create_identity(&self, id: &str, sighting: Sighting) -> Result<Identity, StoreError> {
        self.write(|tx| {
            if load(tx, id)?.is_some() {
                return Err(StoreError::AlreadyExists(id.to_string()));
            }
            if let Some((other, expected)) = stored_dim(tx)? {
                let got = sighting.descriptor.len();
                if got != expected {
                    return Err(ValidationError::SampleDimension {
                        id: other,
                        expected,
                        got,
                    }
                    .into());
                }
            }
            let ident = Identity::create(id, sighting);
            save(tx, &ident)?;
            if let Some(n) = numeric_tail(id) {
                let mut meta = tx.open_table(META).map_err(backend)?;
                let current = meta
                    .get(HIGH_WATER_KEY)
                    .map_err(backend)?
                    .map(|v| v.value());
                if current.is_none_or(|c| n > c) {
                    meta.insert(HIGH_WATER_KEY, n).map_err(backend)?;
                }
            }
            Ok(ident)
        })
    }

    fn merge(&self, source_id: &str, target_id: &str) -> Result<Identity, StoreError> {
        if source_id == target_id {
            return Err(StoreError::InvalidMerge(format!(
                "source and target are both {source_id}"
            )));
        }
        self.write(|tx| {
            let source = load(tx, source_id)?
                .ok_or_else(|| StoreError::NotFound(source_id.to_string()))?;
            let mut target = load(tx, target_id)?
                .ok_or_else(|| StoreError::NotFound(target_id.to_string()))?;
            target.absorb_identity(source, self.max_samples)?;
            save(tx, &target)?;
            remove(tx, source_id)?;
            Ok(target)
        })
    }

    fn garbage_collect(&self, candidates: &[GcCandidate]) -> Result<Vec<String>, StoreError> {
        self.write(|tx| {
            let mut deleted = Vec::new();
            for c in candidates {
                if c.photo_count == 0 {
                    if remove(tx, &c.id)? {
                        deleted.push(c.id.clone());
                    }
                } else if let Some(mut ident) = load(tx, &c.id)? {
                    ident.photo_count = c.photo_count;
                    save(tx, &ident)?;
                }
            }
            Ok(deleted)
        })
    }
}

/// A [`PhotoRepository`] stored in the same redb file as a [`RedbStore`].
/// Rows map photo id → JSON array of identity ids.
#[derive(Clone)]
pub struct RedbPhotoIndex {
    db: Arc<Database>,
}

fn repo_err<E: fmt::Display>(e: E) -> CollabError {
    CollabError::Repository(e.to_string())
}

fn decode_refs(data: &[u8]) -> Result<Vec<String>, CollabError> {
    serde_json::from_slice(data).map_err(repo_err)
}

impl RedbPhotoIndex {
    /// Identities referenced by `photo_id`, in attach order.
    pub fn identities_of(&self, photo_id: &str) -> Result<Vec<String>, CollabError> {
        let tx = self.db.begin_read().map_err(repo_err)?;
        let table = tx.open_table(PHOTOS).map_err(repo_err)?;
        match table.get(photo_id).map_err(repo_err)? {
            Some(v) => decode_refs(v.value()),
            None => Ok(Vec::new()),
        }
    }

    fn all(&self) -> Result<Vec<(String, Vec<String>)>, CollabError> {
        let tx = self.db.begin_read().map_err(repo_err)?;
        let table = tx.open_table(PHOTOS).map_err(repo_err)?;
        let mut out = Vec::new();
        for item in table.iter().map_err(repo_err)? {
            let (k, v) = item.map_err(repo_err)?;
            out.push((k.value().to_string(), decode_refs(v.value())?));
        }
        Ok(out)
    }
}

#[async_trait]
impl PhotoRepository for RedbPhotoIndex {
    async fn attach(&self, photo_id: &str, identity_ids: &[String]) -> Result<(), CollabError> {
        let tx = self.db.begin_write().map_err(repo_err)?;
        {
            let mut table = tx.open_table(PHOTOS).map_err(repo_err)?;
            let existing = table
                .get(photo_id)
                .map_err(repo_err)?
                .map(|v| v.value().to_vec());
            let mut refs = match existing {
                Some(d) => decode_refs(&d)?,
                None => Vec::new(),
            };
            push_distinct(&mut refs, identity_ids);
            let data = serde_json::to_vec(&refs).map_err(repo_err)?;
            table.insert(photo_id, data.as_slice()).map_err(repo_err)?;
        }
        tx.commit().map_err(repo_err)?;
        Ok(())
    }

    async fn detach(&self, photo_id: &str) -> Result<Vec<String>, CollabError> {
        let tx = self.db.begin_write().map_err(repo_err)?;
        let removed = {
            let mut table = tx.open_table(PHOTOS).map_err(repo_err)?;
            table
                .remove(photo_id)
                .map_err(repo_err)?
                .map(|v| v.value().to_vec())
        };
        tx.commit().map_err(repo_err)?;
        match removed {
            Some(d) => decode_refs(&d),
            None => Ok(Vec::new()),
        }
    }

    async fn reassign(&self, source_id: &str, target_id: &str) -> Result<usize, CollabError> {
        let mut changed = Vec::new();
        for (photo, mut refs) in self.all()? {
            if rewrite(&mut refs, source_id, target_id) {
                changed.push((photo, refs));
            }
        }
        if changed.is_empty() {
            return Ok(0);
        }

        let tx = self.db.begin_write().map_err(repo_err)?;
        {
            let mut table = tx.open_table(PHOTOS).map_err(repo_err)?;
            for (photo, refs) in &changed {
                let data = serde_json::to_vec(refs).map_err(repo_err)?;
                table.insert(photo.as_str(), data.as_slice()).map_err(repo_err)?;
            }
        }
        tx.commit().map_err(repo_err)?;
        Ok(changed.len())
    }

    async fn count_references(&self, identity_id: &str) -> Result<u32, CollabError> {
        let n = self
            .all()?
            .iter()
            .filter(|(_, refs)| refs.iter().any(|r| r == identity_id))
            .count();
        Ok(n as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use tempfile::tempdir;

    fn sighting(v: f32) -> Sighting {
        Sighting::new(Descriptor::filled(v, 4), "photo-1")
    }

    #[test]
    fn test_redb_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.redb");
        {
            let store = RedbStore::open_default(&path).unwrap();
            store.create_identity("person_1", sighting(0.1)).unwrap();
            store.apply_match("person_1", sighting(0.3)).unwrap();
        }
        let store = RedbStore::open_default(&path).unwrap();
        let ident = store.get("person_1").unwrap().unwrap();
        assert_eq!(ident.photo_count, 2);
        assert_eq!(ident.samples.len(), 2);
        assert!((ident.average[0] - 0.2).abs() < 1e-6);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_redb_merge_and_gc() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("faces.redb"), 3).unwrap();
        store.create_identity("person_1", sighting(0.1)).unwrap();
        store.create_identity("person_2", sighting(0.9)).unwrap();
        for _ in 0..3 {
            store.apply_match("person_2", sighting(0.9)).unwrap();
        }

        let merged = store.merge("person_2", "person_1").unwrap();
        assert_eq!(merged.samples.len(), 3);
        assert_eq!(merged.photo_count, 5);
        assert!(store.get("person_2").unwrap().is_none());
        assert!(matches!(
            store.merge("person_2", "person_1"),
            Err(StoreError::NotFound(_))
        ));

        let deleted = store
            .garbage_collect(&[GcCandidate::new("person_1", 0)])
            .unwrap();
        assert_eq!(deleted, vec!["person_1".to_string()]);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_redb_rejects_other_dimension() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open_default(dir.path().join("faces.redb")).unwrap();
        store.create_identity("person_1", sighting(1.0)).unwrap();

        let narrow = || Sighting::new(Descriptor::filled(3.0, 2), "photo-2");
        let err = store.apply_match("person_1", narrow()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::SampleDimension { expected: 4, got: 2, .. })
        ));
        assert!(matches!(
            store.create_identity("person_2", narrow()),
            Err(StoreError::Validation(_))
        ));

        let ident = store.get("person_1").unwrap().unwrap();
        assert_eq!(ident.average, vec![1.0; 4]);
        assert_eq!(ident.photo_count, 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_redb_merge_rejects_other_dimension() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open_default(dir.path().join("faces.redb")).unwrap();
        store.create_identity("person_1", sighting(1.0)).unwrap();
        store
            .write(|tx| {
                let narrow = Sighting::new(Descriptor::filled(1.0, 2), "photo-2");
                save(tx, &Identity::create("person_2", narrow))
            })
            .unwrap();

        assert!(matches!(
            store.merge("person_2", "person_1"),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get("person_1").unwrap().unwrap().photo_count, 1);
    }

    #[test]
    fn test_redb_high_water_survives_deletion() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.redb");
        {
            let store = RedbStore::open_default(&path).unwrap();
            store.create_identity("person_1", sighting(0.1)).unwrap();
            store.create_identity("person_2", sighting(0.5)).unwrap();
            store
                .garbage_collect(&[GcCandidate::new("person_2", 0)])
                .unwrap();
        }
        let store = RedbStore::open_default(&path).unwrap();
        let snap = store.snapshot("person").unwrap();
        assert_eq!(snap.high_water, Some(2));
        assert_eq!(snap.next_suffix(1), 3);
    }

    #[tokio::test]
    async fn test_redb_photo_index() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open_default(dir.path().join("faces.redb")).unwrap();
        let photos = store.photo_index();

        photos
            .attach("p1", &["person_1".to_string(), "person_2".to_string()])
            .await
            .unwrap();
        photos.attach("p2", &["person_2".to_string()]).await.unwrap();
        assert_eq!(photos.count_references("person_2").await.unwrap(), 2);

        assert_eq!(photos.reassign("person_2", "person_1").await.unwrap(), 2);
        assert_eq!(photos.identities_of("p1").unwrap(), vec!["person_1".to_string()]);
        assert_eq!(photos.count_references("person_1").await.unwrap(), 2);

        let affected = photos.detach("p2").await.unwrap();
        assert_eq!(affected, vec!["person_1".to_string()]);
        assert_eq!(photos.count_references("person_1").await.unwrap(), 1);
    }
}

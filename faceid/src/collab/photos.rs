use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CollabError, PhotoRepository};

/// In-memory [`PhotoRepository`].
#[derive(Default)]
pub struct MemoryPhotoIndex {
    photos: RwLock<BTreeMap<String, Vec<String>>>,
}

impl MemoryPhotoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities referenced by `photo_id`, in attach order.
    pub fn identities_of(&self, photo_id: &str) -> Vec<String> {
        self.photos.read().get(photo_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.photos.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Appends ids not already present.
pub(crate) fn push_distinct(refs: &mut Vec<String>, ids: &[String]) {
    for id in ids {
        if !refs.contains(id) {
            refs.push(id.clone());
        }
    }
}

/// Rewrites `source` to `target` in place. Returns true if anything changed.
pub(crate) fn rewrite(refs: &mut Vec<String>, source: &str, target: &str) -> bool {
    if !refs.iter().any(|r| r == source) {
        return false;
    }
    let had_target = refs.iter().any(|r| r == target);
    if had_target {
        refs.retain(|r| r != source);
    } else {
        for r in refs.iter_mut() {
            if r == source {
                *r = target.to_string();
            }
        }
    }
    true
}

#[async_trait]
impl PhotoRepository for MemoryPhotoIndex {
    async fn attach(&self, photo_id: &str, identity_ids: &[String]) -> Result<(), CollabError> {
        let mut photos = self.photos.write();
        push_distinct(photos.entry(photo_id.to_string()).or_default(), identity_ids);
        Ok(())
    }

    async fn detach(&self, photo_id: &str) -> Result<Vec<String>, CollabError> {
        Ok(self.photos.write().remove(photo_id).unwrap_or_default())
    }

    async fn reassign(&self, source_id: &str, target_id: &str) -> Result<usize, CollabError> {
        let mut photos = self.photos.write();
        let mut touched = 0;
        for refs in photos.values_mut() {
            if rewrite(refs, source_id, target_id) {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn count_references(&self, identity_id: &str) -> Result<u32, CollabError> {
        let photos = self.photos.read();
        let n = photos
            .values()
            .filter(|refs| refs.iter().any(|r| r == identity_id))
            .count();
        Ok(n as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn attach_is_additive_and_distinct() {
        let idx = MemoryPhotoIndex::new();
        idx.attach("p1", &ids(&["person_1", "person_2"])).await.unwrap();
        idx.attach("p1", &ids(&["person_2", "person_3"])).await.unwrap();
        assert_eq!(idx.identities_of("p1"), ids(&["person_1", "person_2", "person_3"]));
    }

    #[tokio::test]
    async fn count_and_detach() {
        let idx = MemoryPhotoIndex::new();
        idx.attach("p1", &ids(&["person_1"])).await.unwrap();
        idx.attach("p2", &ids(&["person_1", "person_2"])).await.unwrap();
        assert_eq!(idx.count_references("person_1").await.unwrap(), 2);

        let affected = idx.detach("p2").await.unwrap();
        assert_eq!(affected, ids(&["person_1", "person_2"]));
        assert_eq!(idx.count_references("person_1").await.unwrap(), 1);
        assert_eq!(idx.count_references("person_2").await.unwrap(), 0);
        assert!(idx.detach("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reassign_rewrites_and_dedupes() {
        let idx = MemoryPhotoIndex::new();
        idx.attach("p1", &ids(&["person_2"])).await.unwrap();
        idx.attach("p2", &ids(&["person_1", "person_2"])).await.unwrap();
        idx.attach("p3", &ids(&["person_3"])).await.unwrap();

        let touched = idx.reassign("person_2", "person_1").await.unwrap();
        assert_eq!(touched, 2);
        assert_eq!(idx.identities_of("p1"), ids(&["person_1"]));
        assert_eq!(idx.identities_of("p2"), ids(&["person_1"]));
        assert_eq!(idx.count_references("person_2").await.unwrap(), 0);
        assert_eq!(idx.count_references("person_1").await.unwrap(), 2);
    }
}

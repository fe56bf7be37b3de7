//! Nearest-average matching.
//!
//! [`decide`] is pure: it sees only an immutable [`Snapshot`] and never reads
//! or writes a store. The resolver takes a fresh snapshot for every
//! observation, under its lock, so each decision reflects all prior commits.

use crate::descriptor::euclidean;
use crate::identity::{Identity, format_id, parse_suffix};

/// What the matcher needs to know about one identity.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,

    /// Numeric id suffix, `None` for ids outside the numbering scheme.
    /// Used for tie-breaking and next-id derivation.
    pub suffix: Option<u64>,

    pub average: Vec<f32>,

    pub has_thumbnail: bool,
}

/// Point-in-time view of all identities.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub candidates: Vec<Candidate>,

    /// Highest suffix ever issued by the store, including deleted ids.
    pub high_water: Option<u64>,
}

impl Snapshot {
    /// Builds a snapshot from identity records.
    pub fn build<'a>(
        identities: impl IntoIterator<Item = &'a Identity>,
        id_prefix: &str,
        high_water: Option<u64>,
    ) -> Self {
        let candidates = identities
            .into_iter()
            .map(|ident| Candidate {
                id: ident.id.clone(),
                suffix: parse_suffix(id_prefix, &ident.id),
                average: ident.average.clone(),
                has_thumbnail: ident.thumbnail_ref.is_some(),
            })
            .collect();
        Self { candidates, high_water }
    }

    /// Suffix the next new identity will get.
    ///
    /// One past the larger of the highest live suffix and the high-water
    /// mark, or `first_id` when nothing was ever issued. Saturates at
    /// `u64::MAX`; creating that id twice fails in the store.
    pub fn next_suffix(&self, first_id: u64) -> u64 {
        let max_live = self.candidates.iter().filter_map(|c| c.suffix).max();
        match max_live.max(self.high_water) {
            Some(max) => max.saturating_add(1).max(first_id),
            None => first_id,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Matching parameters, a subset of [`Config`](crate::Config).
#[derive(Debug, Clone)]
pub struct MatchParams {
    pub threshold: f32,
    pub id_prefix: String,
    pub first_id: u64,
}

/// Outcome of matching one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The descriptor belongs to an existing identity.
    Matched { id: String, distance: f32 },

    /// No identity is close enough; a new one should be created.
    /// `nearest` is the distance to the closest existing identity, if any.
    New { id: String, nearest: Option<f32> },
}

impl Decision {
    pub fn id(&self) -> &str {
        match self {
            Decision::Matched { id, .. } | Decision::New { id, .. } => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Decision::New { .. })
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            Decision::Matched { distance, .. } => Some(*distance),
            Decision::New { nearest, .. } => *nearest,
        }
    }
}

/// Finds the identity whose average is nearest to `descriptor`.
///
/// Accepts the match when the distance is strictly below
/// `params.threshold`. Ties go to the lowest suffix.
pub fn decide(descriptor: &[f32], snapshot: &Snapshot, params: &MatchParams) -> Decision {
    let mut best: Option<(&Candidate, f32)> = None;
    for c in &snapshot.candidates {
        let d = euclidean(descriptor, &c.average);
        best = match best {
            None => Some((c, d)),
            Some((b, bd)) if d < bd || (d == bd && tie_rank(c) < tie_rank(b)) => Some((c, d)),
            keep => keep,
        };
    }

    match best {
        Some((c, d)) if d < params.threshold => Decision::Matched {
            id: c.id.clone(),
            distance: d,
        },
        other => Decision::New {
            id: format_id(&params.id_prefix, snapshot.next_suffix(params.first_id)),
            nearest: other.map(|(_, d)| d),
        },
    }
}

fn tie_rank(c: &Candidate) -> u64 {
    c.suffix.unwrap_or(u64::MAX)
}

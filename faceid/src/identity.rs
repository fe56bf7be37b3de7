use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::{Descriptor, mean};
use crate::error::ValidationError;

/// One recurring person across the photo collection.
///
/// `average` is always the elementwise mean of `samples`. All mutation goes
/// through [`Identity::create`], [`Identity::absorb`] and
/// [`Identity::absorb_identity`], which maintain that invariant and the
/// retention cap.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier (e.g. "person_3"). Never reused.
    pub id: String,

    /// Retained descriptors, oldest first.
    pub samples: Vec<Descriptor>,

    /// Mean of `samples`.
    pub average: Vec<f32>,

    /// Photos currently referencing this identity.
    pub photo_count: u32,

    /// Opaque thumbnail reference. First write wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,

    pub last_seen: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("samples", &self.samples.len())
            .field("photo_count", &self.photo_count)
            .field("thumbnail_ref", &self.thumbnail_ref)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}

/// A single observation being committed to an identity.
#[derive(Debug, Clone)]
pub struct Sighting {
    pub descriptor: Descriptor,
    pub photo_id: String,
    pub thumbnail_ref: Option<String>,
    pub seen_at: DateTime<Utc>,
}

impl Sighting {
    pub fn new(descriptor: Descriptor, photo_id: impl Into<String>) -> Self {
        Self {
            descriptor,
            photo_id: photo_id.into(),
            thumbnail_ref: None,
            seen_at: Utc::now(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_ref: impl Into<String>) -> Self {
        self.thumbnail_ref = Some(thumbnail_ref.into());
        self
    }

    pub fn at(mut self, seen_at: DateTime<Utc>) -> Self {
        self.seen_at = seen_at;
        self
    }
}

impl Identity {
    /// Builds a brand-new identity from its first sighting.
    pub fn create(id: impl Into<String>, sighting: Sighting) -> Self {
        let average = sighting.descriptor.to_vec();
        Self {
            id: id.into(),
            samples: vec![sighting.descriptor],
            average,
            photo_count: 1,
            thumbnail_ref: sighting.thumbnail_ref,
            last_seen: sighting.seen_at,
            created_at: sighting.seen_at,
        }
    }

    /// Records a matched sighting: appends the sample (evicting the oldest
    /// beyond `max_samples`), bumps the photo count and refreshes `last_seen`.
    ///
    /// Fails without touching `self` when the sighting's dimension differs
    /// from the retained samples.
    pub fn absorb(
        &mut self,
        sighting: Sighting,
        max_samples: usize,
    ) -> Result<(), ValidationError> {
        self.check_dim(sighting.descriptor.len())?;
        self.samples.push(sighting.descriptor);
        self.retain_recent(max_samples);
        self.photo_count = self.photo_count.saturating_add(1);
        self.last_seen = sighting.seen_at;
        if self.thumbnail_ref.is_none() {
            self.thumbnail_ref = sighting.thumbnail_ref;
        }
        Ok(())
    }

    /// Folds `source` into `self`.
    ///
    /// Samples of the identity seen less recently come first, so the
    /// retained window favors the most recent sightings. On equal
    /// `last_seen` the target's samples are treated as newer.
    pub fn absorb_identity(
        &mut self,
        source: Identity,
        max_samples: usize,
    ) -> Result<(), ValidationError> {
        self.check_dim(source.dim())?;
        let own = std::mem::take(&mut self.samples);
        self.samples = if source.last_seen > self.last_seen {
            own.into_iter().chain(source.samples).collect()
        } else {
            source.samples.into_iter().chain(own).collect()
        };
        self.retain_recent(max_samples);
        self.photo_count = self.photo_count.saturating_add(source.photo_count);
        self.last_seen = self.last_seen.max(source.last_seen);
        self.created_at = self.created_at.min(source.created_at);
        if self.thumbnail_ref.is_none() {
            self.thumbnail_ref = source.thumbnail_ref;
        }
        Ok(())
    }

    /// Dimension of the retained samples.
    pub fn dim(&self) -> usize {
        self.average.len()
    }

    pub(crate) fn check_dim(&self, got: usize) -> Result<(), ValidationError> {
        if got != self.dim() {
            return Err(ValidationError::SampleDimension {
                id: self.id.clone(),
                expected: self.dim(),
                got,
            });
        }
        Ok(())
    }

    /// Numeric suffix of the id under `prefix`, if it has one.
    pub fn suffix(&self, prefix: &str) -> Option<u64> {
        parse_suffix(prefix, &self.id)
    }

    fn retain_recent(&mut self, max_samples: usize) {
        let max = max_samples.max(1);
        if self.samples.len() > max {
            let excess = self.samples.len() - max;
            self.samples.drain(..excess);
        }
        self.average = mean(&self.samples);
    }
}

/// Formats an identity id, e.g. `format_id("person", 3) == "person_3"`.
pub fn format_id(prefix: &str, suffix: u64) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}_{suffix}")
    }
}

/// Inverse of [`format_id`]. Returns `None` for ids outside the scheme.
pub fn parse_suffix(prefix: &str, id: &str) -> Option<u64> {
    let digits = if prefix.is_empty() {
        id
    } else {
        id.strip_prefix(prefix)?.strip_prefix('_')?
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Trailing run of digits in `id`, whatever its prefix.
///
/// Stores use this to keep a high-water mark of issued ids without knowing
/// the configured prefix.
pub fn numeric_tail(id: &str) -> Option<u64> {
    let start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    id[start..].parse().ok()
}

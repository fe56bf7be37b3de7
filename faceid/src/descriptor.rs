use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A face descriptor with a validated dimension.
///
/// Construct with [`Descriptor::new`], which rejects vectors of the wrong
/// length or containing NaN/infinite components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    /// Validates `values` against `dim`. `index` is the position of the
    /// observation in its batch and is only used for error reporting.
    pub fn new(values: Vec<f32>, dim: usize, index: usize) -> Result<Self, ValidationError> {
        if values.len() != dim {
            return Err(ValidationError::DimensionMismatch {
                index,
                expected: dim,
                got: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError::NonFinite { index });
        }
        Ok(Self(values))
    }

    /// Fills all `dim` components with `value`.
    pub fn filled(value: f32, dim: usize) -> Self {
        Self(vec![value; dim])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for Descriptor {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl AsRef<[f32]> for Descriptor {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Euclidean (L2) distance. Accumulates in f64.
///
/// Extra components of the longer slice are ignored; callers validate
/// dimensions at the store boundary.
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    let mut sum: f64 = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = (*x as f64) - (*y as f64);
        sum += d * d;
    }
    sum.sqrt() as f32
}

/// Elementwise mean of `samples`. Returns an empty vector for no samples.
pub fn mean<S: AsRef<[f32]>>(samples: &[S]) -> Vec<f32> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let dim = first.as_ref().len();
    let mut acc = vec![0.0f64; dim];
    for s in samples {
        for (a, v) in acc.iter_mut().zip(s.as_ref().iter()) {
            *a += *v as f64;
        }
    }
    let n = samples.len() as f64;
    acc.into_iter().map(|a| (a / n) as f32).collect()
}

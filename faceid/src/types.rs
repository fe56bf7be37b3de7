use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Face location within its source photo, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One detected face submitted for resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub descriptor: Vec<f32>,

    pub photo_id: String,

    #[serde(default)]
    pub bounding_box: BoundingBox,

    /// Cropped face image, uploaded when the identity has no thumbnail yet.
    #[serde(skip)]
    pub thumbnail: Option<Bytes>,
}

impl Observation {
    pub fn new(descriptor: Vec<f32>, photo_id: impl Into<String>) -> Self {
        Self {
            descriptor,
            photo_id: photo_id.into(),
            bounding_box: BoundingBox::default(),
            thumbnail: None,
        }
    }

    pub fn with_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    pub fn with_thumbnail(mut self, image: impl Into<Bytes>) -> Self {
        self.thumbnail = Some(image.into());
        self
    }
}

/// All faces detected in one uploaded photo, as parallel arrays.
///
/// `boxes` must match `descriptors` in length. `thumbnails` is either empty
/// (no thumbnails) or the same length.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotoUpload {
    pub photo_id: String,

    pub descriptors: Vec<Vec<f32>>,

    #[serde(default)]
    pub boxes: Vec<BoundingBox>,

    #[serde(skip)]
    pub thumbnails: Vec<Bytes>,
}

impl PhotoUpload {
    /// Checks array lengths and splits into observations.
    pub fn into_observations(self) -> Result<Vec<Observation>, ValidationError> {
        let n = self.descriptors.len();
        if self.boxes.len() != n {
            return Err(ValidationError::LengthMismatch {
                field: "boxes",
                expected: n,
                got: self.boxes.len(),
            });
        }
        if !self.thumbnails.is_empty() && self.thumbnails.len() != n {
            return Err(ValidationError::LengthMismatch {
                field: "thumbnails",
                expected: n,
                got: self.thumbnails.len(),
            });
        }

        let mut thumbs = self.thumbnails.into_iter();
        Ok(self
            .descriptors
            .into_iter()
            .zip(self.boxes)
            .map(|(descriptor, bounding_box)| Observation {
                descriptor,
                photo_id: self.photo_id.clone(),
                bounding_box,
                thumbnail: thumbs.next(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_splits_in_order() {
        let upload = PhotoUpload {
            photo_id: "p1".into(),
            descriptors: vec![vec![0.1], vec![0.2]],
            boxes: vec![BoundingBox::default(); 2],
            thumbnails: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        };
        let obs = upload.into_observations().unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].descriptor, vec![0.2]);
        assert_eq!(obs[1].thumbnail.as_deref(), Some(&b"b"[..]));
        assert!(obs.iter().all(|o| o.photo_id == "p1"));
    }

    #[test]
    fn upload_without_thumbnails() {
        let upload = PhotoUpload {
            photo_id: "p1".into(),
            descriptors: vec![vec![0.1]],
            boxes: vec![BoundingBox::default()],
            thumbnails: vec![],
        };
        let obs = upload.into_observations().unwrap();
        assert!(obs[0].thumbnail.is_none());
    }

    #[test]
    fn upload_rejects_box_mismatch() {
        let upload = PhotoUpload {
            photo_id: "p1".into(),
            descriptors: vec![vec![0.1], vec![0.2]],
            boxes: vec![BoundingBox::default()],
            thumbnails: vec![],
        };
        assert_eq!(
            upload.into_observations().unwrap_err(),
            ValidationError::LengthMismatch { field: "boxes", expected: 2, got: 1 }
        );
    }

    #[test]
    fn upload_rejects_thumbnail_mismatch() {
        let upload = PhotoUpload {
            photo_id: "p1".into(),
            descriptors: vec![vec![0.1], vec![0.2]],
            boxes: vec![BoundingBox::default(); 2],
            thumbnails: vec![Bytes::from_static(b"a")],
        };
        assert!(matches!(
            upload.into_observations(),
            Err(ValidationError::LengthMismatch { field: "thumbnails", .. })
        ));
    }

    #[test]
    fn upload_deserializes_without_optional_fields() {
        let upload: PhotoUpload =
            serde_json::from_str(r#"{"photo_id":"p9","descriptors":[[0.5,0.5]],"boxes":[{"x":1,"y":2,"width":3,"height":4}]}"#)
                .unwrap();
        assert_eq!(upload.boxes[0].height, 4.0);
        assert!(upload.thumbnails.is_empty());
    }
}

//! Contracts for the components the frame pipeline consumes but does not
//! implement: face matching, pose-based posture assessment and snapshot
//! storage.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use image::RgbImage;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            image,
        }
    }
}

/// Face location in pixel coordinates (top, right, bottom, left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    /// `group/name` label of the closest known face, or `unknown`.
    pub identity: String,
    pub distance: f64,
    pub location: BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostureAssessment {
    pub is_bad: bool,
    pub nose_drop: f64,
    pub neck_angle: f64,
    pub reasons: Vec<String>,
}

pub trait IdentityMatcher: Send + Sync {
    /// Matches in the matcher's own order; empty when no face is found.
    fn recognize(&self, frame: &Frame) -> Result<Vec<FaceMatch>>;
}

pub trait PostureAssessor: Send + Sync {
    /// `None` when the frame has no usable landmarks.
    fn analyze(&self, frame: &Frame) -> Result<Option<PostureAssessment>>;
}

pub trait SnapshotSink: Send + Sync {
    /// Path of the written snapshot, or `None` when nothing was saved.
    fn save(&self, identity: &str, frame: &Frame) -> Option<PathBuf>;
}

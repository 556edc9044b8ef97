//! Posture event data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored posture assessment for an attributed identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostureEvent {
    pub id: i64,
    pub identity: String,
    pub is_bad: bool,
    pub nose_drop: f64,
    pub neck_angle: f64,
    /// Short reason codes in the order the assessor produced them.
    pub reasons: Vec<String>,
    pub match_distance: Option<f64>,
    pub frame_path: Option<String>,
    /// Cleared to `None` when the referenced capture row is pruned.
    pub capture_event_id: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

/// Insert payload; `id` and `recorded_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPostureEvent {
    pub identity: String,
    pub is_bad: bool,
    pub nose_drop: f64,
    pub neck_angle: f64,
    pub reasons: Vec<String>,
    pub match_distance: Option<f64>,
    pub frame_path: Option<String>,
    pub capture_event_id: Option<i64>,
}

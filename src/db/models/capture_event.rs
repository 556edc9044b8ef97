//! Capture event data model.
//!
//! One row per detected face per frame. Rows are immutable once written and
//! are only ever removed by retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureEvent {
    pub id: i64,
    /// Matched identity label, or `unknown`.
    pub identity: String,
    /// Identity prefix before the first `/`, or `unknown`.
    pub group: String,
    pub match_distance: Option<f64>,
    pub frame_path: Option<String>,
    pub captured_at: DateTime<Utc>,
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::{
    alert::{build_actuator, AlertThrottle},
    capture::IdentityCapture,
    db::{Database, NewPostureEvent},
    motion::MotionGate,
    settings::Settings,
};

use super::collaborators::{Frame, IdentityMatcher, PostureAssessor, SnapshotSink};
use super::window::{
    derive_group, is_unknown, AllowedGroupWindow, Authorization, AuthorizationFilter,
    UNKNOWN_IDENTITY,
};

// Set to false to silence per-frame logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// What the stream loop should do after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDecision {
    Continue,
    /// The motion gate is closed; the stream loop should end and wait for
    /// the next activation. `reason` is set when the gate just timed out.
    Stop { reason: Option<String> },
}

/// Capture row written for an identity in the current frame.
#[derive(Debug, Clone)]
struct CaptureRecord {
    capture_event_id: Option<i64>,
    frame_path: Option<String>,
    match_distance: f64,
}

/// Per-frame orchestration: gate check, identity capture logging,
/// authorization, posture logging and alerting.
///
/// Capture and posture rows are committed separately. If the process dies
/// between the two, a capture row without a posture row is left behind;
/// posture rows only ever reference capture ids that were committed first.
pub struct FramePipeline {
    db: Database,
    matcher: Arc<dyn IdentityMatcher>,
    assessor: Arc<dyn PostureAssessor>,
    snapshots: Option<Arc<dyn SnapshotSink>>,
    gate: Option<Arc<MotionGate>>,
    throttle: Option<AlertThrottle>,
    filter: AuthorizationFilter,
    allowed_window: AllowedGroupWindow,
}

impl FramePipeline {
    pub fn new(
        db: Database,
        matcher: Arc<dyn IdentityMatcher>,
        assessor: Arc<dyn PostureAssessor>,
    ) -> Self {
        Self {
            db,
            matcher,
            assessor,
            snapshots: None,
            gate: None,
            throttle: None,
            filter: AuthorizationFilter::unrestricted(),
            allowed_window: AllowedGroupWindow::default(),
        }
    }

    /// Wires gate, alert throttle, authorization filter and snapshot sink
    /// from configuration around the given collaborators.
    pub fn from_settings(
        settings: &Settings,
        db: Database,
        matcher: Arc<dyn IdentityMatcher>,
        assessor: Arc<dyn PostureAssessor>,
    ) -> Result<Self> {
        let monitoring = &settings.monitoring;
        let mut pipeline = Self::new(db, matcher, assessor).with_authorization(
            AuthorizationFilter::new(
                monitoring.group_set(),
                monitoring.identity_set(),
                monitoring.grace(),
            ),
        );

        if settings.motion.enabled {
            pipeline = pipeline
                .with_motion_gate(Arc::new(MotionGate::new(settings.motion.idle_timeout())));
        }

        if let Some(actuator) = build_actuator(&settings.alert) {
            pipeline = pipeline.with_alert_throttle(AlertThrottle::new(
                actuator,
                settings.alert.min_gap(),
                settings.alert.beep_count,
                settings.alert.beep_interval(),
            ));
        }

        if let Some(capture) = IdentityCapture::from_settings(&settings.identity_capture)? {
            pipeline = pipeline.with_snapshot_sink(Arc::new(capture));
        }

        Ok(pipeline)
    }

    pub fn with_motion_gate(mut self, gate: Arc<MotionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.snapshots = Some(sink);
        self
    }

    pub fn with_alert_throttle(mut self, throttle: AlertThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn with_authorization(mut self, filter: AuthorizationFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn motion_gate(&self) -> Option<&Arc<MotionGate>> {
        self.gate.as_ref()
    }

    pub async fn process_frame(&mut self, frame: &Frame) -> FrameDecision {
        self.process_frame_at(frame, Instant::now()).await
    }

    pub async fn process_frame_at(&mut self, frame: &Frame, now: Instant) -> FrameDecision {
        if let Some(gate) = &self.gate {
            let decision = gate.should_process_at(now);
            if !decision.active {
                if let Some(reason) = &decision.reason {
                    log_info!("Stopping stream: {reason}");
                }
                return FrameDecision::Stop {
                    reason: decision.reason,
                };
            }
        }

        let matches = match self.matcher.recognize(frame) {
            Ok(matches) => matches,
            Err(err) => {
                log_warn!("Identity matching failed on frame {}: {err:#}", frame.sequence);
                Vec::new()
            }
        };
        if matches.is_empty() {
            log_debug!("No faces in frame {}; skipping posture analysis", frame.sequence);
            return FrameDecision::Continue;
        }

        let mut captures: HashMap<String, CaptureRecord> = HashMap::new();
        for face in &matches {
            let identity = normalize_identity(&face.identity);
            let group = derive_group(&identity).to_string();

            let frame_path = self
                .snapshots
                .as_ref()
                .and_then(|sink| sink.save(&identity, frame))
                .map(|path| path.to_string_lossy().into_owned());

            let capture_event_id = match self
                .db
                .log_capture_event(&identity, &group, Some(face.distance), frame_path.as_deref())
                .await
            {
                Ok(id) => Some(id),
                Err(err) => {
                    log_error!("Dropping capture event for {identity}: {err:#}");
                    None
                }
            };

            // Two faces can share a label (e.g. several unknowns); the first
            // one, which is the primary when it leads, keeps the link.
            captures.entry(identity.clone()).or_insert(CaptureRecord {
                capture_event_id,
                frame_path,
                match_distance: face.distance,
            });

            if self.filter.is_configured() && self.filter.allows(&identity) {
                self.allowed_window.refresh(&identity, now);
            }
        }

        let primary = &matches[0];
        let primary_identity = normalize_identity(&primary.identity);
        if is_unknown(&primary_identity) {
            log_info!("Unknown person detected (dist {:.2})", primary.distance);
        } else {
            log_info!("Recognized {} (dist {:.2})", primary_identity, primary.distance);
        }

        if let Some(gate) = &self.gate {
            gate.mark_subject_seen_at(now);
        }

        let identity = match self
            .filter
            .authorize(&primary_identity, &self.allowed_window, now)
        {
            Authorization::Proceed { identity } => identity,
            Authorization::Denied => {
                log_debug!("Skipping posture analysis for {primary_identity}; not monitored");
                return FrameDecision::Continue;
            }
        };

        let assessment = match self.assessor.analyze(frame) {
            Ok(Some(assessment)) => assessment,
            Ok(None) => {
                log_info!("Posture not available for {identity}");
                return FrameDecision::Continue;
            }
            Err(err) => {
                log_warn!("Posture assessment failed for {identity}: {err:#}");
                return FrameDecision::Continue;
            }
        };

        if assessment.is_bad {
            log_warn!(
                "Bad posture ({:.3} drop / {:.1}°) detected for {}: {}",
                assessment.nose_drop,
                assessment.neck_angle,
                identity,
                assessment.reasons.join(", ")
            );
        } else {
            log_info!(
                "Posture looks good ({:.3} drop / {:.1}°) for {}",
                assessment.nose_drop,
                assessment.neck_angle,
                identity
            );
        }

        let record = captures.get(&identity);
        let event = NewPostureEvent {
            identity: identity.clone(),
            is_bad: assessment.is_bad,
            nose_drop: assessment.nose_drop,
            neck_angle: assessment.neck_angle,
            reasons: assessment.reasons.clone(),
            match_distance: record.map(|r| r.match_distance),
            frame_path: record.and_then(|r| r.frame_path.clone()),
            capture_event_id: record.and_then(|r| r.capture_event_id),
        };
        if let Err(err) = self.db.log_posture_event(event).await {
            log_error!("Dropping posture event for {identity}: {err:#}");
        }

        if assessment.is_bad {
            if let Some(throttle) = self.throttle.as_mut() {
                throttle.maybe_alert_at(true, now);
            }
        }

        FrameDecision::Continue
    }
}

fn normalize_identity(identity: &str) -> String {
    if is_unknown(identity) {
        UNKNOWN_IDENTITY.to_string()
    } else {
        identity.trim().to_string()
    }
}

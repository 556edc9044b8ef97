use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbImage;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use deskwatch_lib::alert::{AlertActuator, AlertThrottle};
use deskwatch_lib::pipeline::{
    BoundingBox, FaceMatch, Frame, IdentityMatcher, PostureAssessment, PostureAssessor,
};
use deskwatch_lib::{
    Database, FrameDecision, FramePipeline, FrameSource, Monitor, MotionGate, PruneLimits,
    Settings,
};

struct FixedMatcher(Vec<FaceMatch>);

impl IdentityMatcher for FixedMatcher {
    fn recognize(&self, _frame: &Frame) -> Result<Vec<FaceMatch>> {
        Ok(self.0.clone())
    }
}

struct FixedAssessor(Option<PostureAssessment>);

impl PostureAssessor for FixedAssessor {
    fn analyze(&self, _frame: &Frame) -> Result<Option<PostureAssessment>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct CountingBuzzer {
    beeps: AtomicU32,
}

impl AlertActuator for CountingBuzzer {
    fn beep(&self, _times: u32, _interval: Duration) -> Result<()> {
        self.beeps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct VecSource {
    frames: Vec<Frame>,
}

impl FrameSource for VecSource {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop())
    }

    fn release(&mut self) {}
}

fn alice() -> FaceMatch {
    FaceMatch {
        identity: "child/alice".into(),
        distance: 0.4,
        location: BoundingBox::default(),
    }
}

fn slouching() -> PostureAssessment {
    PostureAssessment {
        is_bad: true,
        nose_drop: 0.2,
        neck_angle: 50.0,
        reasons: vec!["head lowered".into()],
    }
}

fn frame(sequence: u64) -> Frame {
    Frame::new(sequence, RgbImage::new(4, 4))
}

#[tokio::test]
async fn recognized_bad_posture_logs_linked_events_and_alerts_once() {
    let db = Database::open_in_memory().unwrap();
    let buzzer = Arc::new(CountingBuzzer::default());
    let gate = Arc::new(MotionGate::new(Duration::from_secs(60)));
    let mut pipeline = FramePipeline::new(
        db.clone(),
        Arc::new(FixedMatcher(vec![alice()])),
        Arc::new(FixedAssessor(Some(slouching()))),
    )
    .with_motion_gate(Arc::clone(&gate))
    .with_alert_throttle(AlertThrottle::new(
        buzzer.clone(),
        Duration::from_secs(10),
        2,
        Duration::from_millis(500),
    ));

    let t0 = Instant::now();
    gate.activate_at(t0);
    assert_eq!(pipeline.process_frame_at(&frame(1), t0).await, FrameDecision::Continue);

    let captures = db.recent_capture_events(10, None).await.unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].identity, "child/alice");
    assert_eq!(captures[0].group, "child");
    assert_eq!(captures[0].match_distance, Some(0.4));

    let postures = db.recent_posture_events(10, false).await.unwrap();
    assert_eq!(postures.len(), 1);
    assert_eq!(postures[0].identity, "child/alice");
    assert!(postures[0].is_bad);
    assert_eq!(postures[0].reasons, vec!["head lowered".to_string()]);
    assert_eq!(postures[0].capture_event_id, Some(captures[0].id));
    assert_eq!(buzzer.beeps.load(Ordering::SeqCst), 1);

    // Inside the alert gap: another row pair, no second alert.
    pipeline
        .process_frame_at(&frame(2), t0 + Duration::from_secs(3))
        .await;
    assert_eq!(db.count_capture_events().await.unwrap(), 2);
    assert_eq!(db.count_posture_events().await.unwrap(), 2);
    assert_eq!(buzzer.beeps.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pruning_captures_keeps_posture_history_with_cleared_links() {
    let db = Database::open_in_memory().unwrap();
    let mut pipeline = FramePipeline::new(
        db.clone(),
        Arc::new(FixedMatcher(vec![alice()])),
        Arc::new(FixedAssessor(Some(slouching()))),
    );
    for sequence in 0..4 {
        pipeline.process_frame(&frame(sequence)).await;
    }

    let deleted = db
        .prune_captures(PruneLimits {
            max_rows: Some(1),
            max_age_days: None,
        })
        .await
        .unwrap();
    assert_eq!(deleted, 3);

    assert_eq!(db.count_capture_events().await.unwrap(), 1);
    assert_eq!(db.count_posture_events().await.unwrap(), 4);
    assert_eq!(db.dangling_posture_references().await.unwrap(), 0);

    let linked = db
        .recent_posture_events(10, true)
        .await
        .unwrap()
        .into_iter()
        .filter(|event| event.capture_event_id.is_some())
        .count();
    assert_eq!(linked, 1);
}

#[tokio::test]
async fn monitor_runs_a_settings_built_pipeline_over_a_source() {
    let settings = Settings::from_json_str(
        r#"{
            "database": { "path": ":memory:" },
            "posture": { "nose_drop": 0.12, "neck_angle": 45.0 },
            "motion": { "enabled": false },
            "monitoring": { "groups": ["child"] },
            "alert": { "output": "log", "min_gap_secs": 10 }
        }"#,
    )
    .unwrap();
    let db = Database::open_in_memory().unwrap();
    let pipeline = FramePipeline::from_settings(
        &settings,
        db.clone(),
        Arc::new(FixedMatcher(vec![alice()])),
        Arc::new(FixedAssessor(Some(slouching()))),
    )
    .unwrap();
    assert!(pipeline.motion_gate().is_none());

    let source = VecSource {
        frames: (0..3).map(frame).collect(),
    };
    let frames = Monitor::new(source, pipeline, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(frames, 3);
    assert_eq!(db.count_capture_events().await.unwrap(), 3);
    assert_eq!(db.count_posture_events().await.unwrap(), 3);
}

#[tokio::test]
async fn unmonitored_group_is_captured_but_never_assessed() {
    let settings = Settings::from_json_str(
        r#"{
            "database": { "path": ":memory:" },
            "posture": { "nose_drop": 0.12, "neck_angle": 45.0 },
            "motion": { "enabled": false },
            "monitoring": { "groups": ["teen"] },
            "alert": { "enabled": false }
        }"#,
    )
    .unwrap();
    let db = Database::open_in_memory().unwrap();
    let mut pipeline = FramePipeline::from_settings(
        &settings,
        db.clone(),
        Arc::new(FixedMatcher(vec![alice()])),
        Arc::new(FixedAssessor(Some(slouching()))),
    )
    .unwrap();

    pipeline.process_frame(&frame(1)).await;

    assert_eq!(db.count_capture_events().await.unwrap(), 1);
    assert_eq!(db.count_posture_events().await.unwrap(), 0);
}

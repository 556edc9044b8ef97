use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::Notify;

/// Result of asking the gate whether frames should be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub active: bool,
    /// Set only on the check that observed the idle timeout; the caller
    /// uses it to end the current stream loop.
    pub reason: Option<String>,
}

impl GateDecision {
    fn open() -> Self {
        Self { active: true, reason: None }
    }

    fn closed() -> Self {
        Self { active: false, reason: None }
    }
}

#[derive(Debug, Default)]
struct MotionWindow {
    active: bool,
    last_subject_seen_at: Option<Instant>,
}

/// Idle/Active state machine shared between the motion sensor callback and
/// the frame loop. Every read-modify-write happens under one mutex.
pub struct MotionGate {
    window: Mutex<MotionWindow>,
    idle_timeout: Duration,
    activated: Notify,
}

impl MotionGate {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            window: Mutex::new(MotionWindow::default()),
            idle_timeout,
            activated: Notify::new(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn lock(&self) -> MutexGuard<'_, MotionWindow> {
        match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn activate(&self) {
        self.activate_at(Instant::now());
    }

    pub fn activate_at(&self, now: Instant) {
        {
            let mut window = self.lock();
            if !window.active {
                info!("Motion gate activated");
            }
            window.active = true;
            window.last_subject_seen_at = Some(now);
        }
        self.activated.notify_one();
    }

    pub fn mark_subject_seen(&self) {
        self.mark_subject_seen_at(Instant::now());
    }

    pub fn mark_subject_seen_at(&self, now: Instant) {
        self.lock().last_subject_seen_at = Some(now);
    }

    pub fn deactivate(&self) {
        let mut window = self.lock();
        if window.active {
            info!("Motion gate deactivated");
        }
        window.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn should_process(&self) -> GateDecision {
        self.should_process_at(Instant::now())
    }

    pub fn should_process_at(&self, now: Instant) -> GateDecision {
        let mut window = self.lock();
        if !window.active {
            return GateDecision::closed();
        }

        let idle_for = window
            .last_subject_seen_at
            .map(|seen| now.saturating_duration_since(seen))
            .unwrap_or_default();
        if idle_for > self.idle_timeout {
            window.active = false;
            let reason = format!("no subject for {}s", self.idle_timeout.as_secs_f64());
            info!("Motion gate idle: {reason}");
            return GateDecision {
                active: false,
                reason: Some(reason),
            };
        }

        GateDecision::open()
    }

    /// Inbound hook for the motion sensor driver. A rising edge activates
    /// the gate; a falling edge is ignored and the idle timeout decides when
    /// processing stops.
    pub fn on_motion(&self, active: bool) {
        if active {
            self.activate();
        } else {
            debug!("Motion cleared; waiting for idle timeout");
        }
    }

    /// Resolves once the gate is active. Activations that happen while no
    /// one is waiting are remembered, so a rising edge is never lost.
    pub async fn wait_for_activation(&self) {
        loop {
            if self.is_active() {
                return;
            }
            self.activated.notified().await;
        }
    }
}

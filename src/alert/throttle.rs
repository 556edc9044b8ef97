use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::AlertActuator;

/// Fires the actuator for bad posture at most once per `min_gap`.
pub struct AlertThrottle {
    actuator: Arc<dyn AlertActuator>,
    min_gap: Duration,
    beep_count: u32,
    beep_interval: Duration,
    last_alert_at: Option<Instant>,
}

impl AlertThrottle {
    pub fn new(
        actuator: Arc<dyn AlertActuator>,
        min_gap: Duration,
        beep_count: u32,
        beep_interval: Duration,
    ) -> Self {
        Self {
            actuator,
            min_gap,
            beep_count,
            beep_interval,
            last_alert_at: None,
        }
    }

    pub fn maybe_alert(&mut self, is_bad_posture: bool) -> bool {
        self.maybe_alert_at(is_bad_posture, Instant::now())
    }

    /// Returns whether the actuator was invoked. The gap is charged before
    /// actuation, so a failing actuator cannot cause an alert storm.
    pub fn maybe_alert_at(&mut self, is_bad_posture: bool, now: Instant) -> bool {
        if !is_bad_posture {
            return false;
        }

        if let Some(last) = self.last_alert_at {
            if now.saturating_duration_since(last) < self.min_gap {
                return false;
            }
        }

        self.last_alert_at = Some(now);
        match self.actuator.beep(self.beep_count, self.beep_interval) {
            Ok(()) => info!("Posture alert fired ({} beeps)", self.beep_count),
            Err(err) => warn!("Posture alert actuation failed: {err:#}"),
        }
        true
    }
}

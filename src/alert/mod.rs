pub mod buzzer;
pub mod throttle;

pub use buzzer::{build_actuator, AlertActuator, LogBuzzer, SpeakerBuzzer};
pub use throttle::AlertThrottle;

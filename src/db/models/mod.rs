pub mod capture_event;
pub mod posture_event;

pub use capture_event::CaptureEvent;
pub use posture_event::{NewPostureEvent, PostureEvent};

pub mod capture_events;
pub mod posture_events;
pub mod retention;

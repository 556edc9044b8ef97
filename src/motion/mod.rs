mod gate;

pub use gate::{GateDecision, MotionGate};
